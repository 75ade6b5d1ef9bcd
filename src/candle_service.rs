use crate::{
    config::ModelConfig,
    model::{LoadError, MorphCnn},
    model_service::{InferenceError, ModelService},
    preprocess::decode_to_tensor,
};
use candle_core::Device;
use candle_nn::ModuleT;

/// Candle-backed [`ModelService`]: owns the loaded network and the device
/// it was placed on. Tensors are immutable and the forward pass takes
/// `&self`, so one instance serves all requests concurrently.
pub struct CandleModelService {
    model: MorphCnn,
    device: Device,
}

impl CandleModelService {
    /// Picks the device once for the process lifetime (CUDA when compiled
    /// in and present, CPU otherwise), then builds the architecture and
    /// fills it from the configured checkpoint.
    pub fn new(model_config: &ModelConfig) -> Result<Self, LoadError> {
        let device = Device::cuda_if_available(0).map_err(LoadError::Device)?;
        let checkpoint = model_config.get_checkpoint_path();
        let model = MorphCnn::load(&checkpoint, &device)?;

        tracing::info!("Loaded checkpoint {:?} on {:?}", checkpoint, device);

        Ok(Self { model, device })
    }
}

impl ModelService for CandleModelService {
    fn score(&self, image: &[u8]) -> Result<f32, InferenceError> {
        let input = decode_to_tensor(image, &self.device)?;
        let output = self.model.forward_t(&input, false)?;
        let probability = output.squeeze(1)?.squeeze(0)?.to_scalar::<f32>()?;

        Ok(probability)
    }
}
