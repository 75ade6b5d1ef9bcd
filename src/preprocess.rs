use candle_core::{DType, Device, Tensor};
use image::imageops::FilterType;
use std::io::Cursor;
use thiserror::Error;

/// Edge length of the square network input, in pixels.
pub const INPUT_SIZE: usize = 224;
/// Per-channel mean for standardization (ImageNet statistics).
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviation for standardization (ImageNet statistics).
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("could not build model input: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Fixed pipeline from uploaded image bytes to the network input tensor.
///
/// The steps and their parameters are part of the model contract and must
/// match what the checkpoint was trained with:
/// 1. decode, format guessed from the bytes (JPEG, PNG, ...);
/// 2. keep RGB, discard alpha;
/// 3. resize (not crop) to `INPUT_SIZE` x `INPUT_SIZE` with bilinear
///    filtering; the aspect ratio may distort;
/// 4. scale pixel values to `[0,1]` and reorder HWC -> CHW;
/// 5. standardize per channel with `CHANNEL_MEAN` / `CHANNEL_STD`;
/// 6. add a leading batch dimension of size 1, on `device`.
///
/// The result has shape `[1, 3, INPUT_SIZE, INPUT_SIZE]` and is
/// deterministic for identical input bytes.
pub fn decode_to_tensor(bytes: &[u8], device: &Device) -> Result<Tensor, DecodeError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::from)?;
    let img = reader
        .decode()?
        .resize_exact(INPUT_SIZE as u32, INPUT_SIZE as u32, FilterType::Triangle);
    let data = img.to_rgb8().into_raw();

    let pixels = Tensor::from_vec(data, (INPUT_SIZE, INPUT_SIZE, 3), device)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?;
    let scaled = (pixels / 255.)?;

    let mean = Tensor::new(&CHANNEL_MEAN, device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&CHANNEL_STD, device)?.reshape((3, 1, 1))?;
    let standardized = scaled.broadcast_sub(&mean)?.broadcast_div(&std)?;

    Ok(standardized.unsqueeze(0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};
    use std::io::Cursor;

    fn png_bytes(img: ImageBuffer<Rgb<u8>, Vec<u8>>) -> Vec<u8> {
        let mut image_data: Vec<u8> = Vec::new();
        let mut cursor = Cursor::new(&mut image_data);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        image_data
    }

    fn gradient_png() -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_fn(320, 180, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        png_bytes(img)
    }

    #[test]
    fn output_shape_is_fixed_regardless_of_input_size() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(100, 50, Rgb([255, 0, 0]));
        let tensor = decode_to_tensor(&png_bytes(img), &Device::Cpu).unwrap();

        assert_eq!(tensor.dims(), &[1, 3, INPUT_SIZE, INPUT_SIZE]);
    }

    #[test]
    fn solid_color_standardizes_to_expected_channel_values() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(64, 64, Rgb([255, 0, 0]));
        let tensor = decode_to_tensor(&png_bytes(img), &Device::Cpu).unwrap();
        let values = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();

        let plane = INPUT_SIZE * INPUT_SIZE;
        let expected = [
            (1.0 - CHANNEL_MEAN[0]) / CHANNEL_STD[0],
            (0.0 - CHANNEL_MEAN[1]) / CHANNEL_STD[1],
            (0.0 - CHANNEL_MEAN[2]) / CHANNEL_STD[2],
        ];
        for channel in 0..3 {
            let got = values[channel * plane];
            assert!(
                (got - expected[channel]).abs() < 1e-4,
                "channel {}: got {}, expected {}",
                channel,
                got,
                expected[channel]
            );
        }
    }

    #[test]
    fn values_stay_in_standardized_range() {
        let tensor = decode_to_tensor(&gradient_png(), &Device::Cpu).unwrap();
        let values = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();

        // Bounds implied by pixel values in [0,1] and the fixed mean/std.
        assert!(values.iter().all(|v| (-2.2..=2.7).contains(v)));
    }

    #[test]
    fn identical_bytes_produce_identical_tensors() {
        let bytes = gradient_png();
        let first = decode_to_tensor(&bytes, &Device::Cpu).unwrap();
        let second = decode_to_tensor(&bytes, &Device::Cpu).unwrap();

        assert_eq!(
            first.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            second.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
    }

    #[test]
    fn alpha_channel_is_discarded() {
        let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_pixel(40, 40, Rgba([10, 200, 30, 0]));
        let mut rgba_bytes: Vec<u8> = Vec::new();
        rgba.write_to(&mut Cursor::new(&mut rgba_bytes), image::ImageFormat::Png)
            .unwrap();
        let rgb = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(40, 40, Rgb([10, 200, 30]));

        let from_rgba = decode_to_tensor(&rgba_bytes, &Device::Cpu).unwrap();
        let from_rgb = decode_to_tensor(&png_bytes(rgb), &Device::Cpu).unwrap();

        assert_eq!(
            from_rgba.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            from_rgb.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
    }

    #[test]
    fn non_image_bytes_are_rejected() {
        let result = decode_to_tensor(b"definitely not an image", &Device::Cpu);

        assert!(matches!(result, Err(DecodeError::Image(_))));
    }
}
