use candle_core::{DType, Device, Tensor};
use candle_nn::{
    batch_norm, conv2d, linear, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Dropout, Linear,
    Module, ModuleT, VarBuilder,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("could not read checkpoint {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse checkpoint {path:?}: {source}")]
    Checkpoint {
        path: PathBuf,
        source: candle_core::Error,
    },
    #[error("checkpoint {path:?} does not match the network architecture: {source}")]
    Parameters {
        path: PathBuf,
        source: candle_core::Error,
    },
    #[error("no usable device: {0}")]
    Device(#[source] candle_core::Error),
}

/// The trained morph classifier: three conv/ReLU/max-pool blocks widening
/// the channels 3 -> 16 -> 32 -> 64, then a fully-connected head with batch
/// normalization, dropout and a sigmoid output emitting the probability
/// that a face is genuine.
///
/// Parameter names follow the `nn.Sequential` indices of the training
/// checkpoint (`conv.0`, `conv.3`, `conv.6`, `fc.1`, `fc.2`, `fc.5`,
/// `fc.8`), so a PyTorch state dict loads without key remapping.
pub struct MorphCnn {
    conv1: Conv2d,
    conv2: Conv2d,
    conv3: Conv2d,
    fc1: Linear,
    bn1: BatchNorm,
    fc2: Linear,
    fc3: Linear,
    dropout1: Dropout,
    dropout2: Dropout,
}

impl MorphCnn {
    pub fn new(vb: VarBuilder) -> candle_core::Result<Self> {
        let conv_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let conv1 = conv2d(3, 16, 3, conv_cfg, vb.pp("conv.0"))?;
        let conv2 = conv2d(16, 32, 3, conv_cfg, vb.pp("conv.3"))?;
        let conv3 = conv2d(32, 64, 3, conv_cfg, vb.pp("conv.6"))?;
        // Three stride-2 pools bring 224 down to 28.
        let fc1 = linear(64 * 28 * 28, 128, vb.pp("fc.1"))?;
        let bn1 = batch_norm(128, BatchNormConfig::default(), vb.pp("fc.2"))?;
        let fc2 = linear(128, 64, vb.pp("fc.5"))?;
        let fc3 = linear(64, 1, vb.pp("fc.8"))?;
        Ok(Self {
            conv1,
            conv2,
            conv3,
            fc1,
            bn1,
            fc2,
            fc3,
            dropout1: Dropout::new(0.5),
            dropout2: Dropout::new(0.3),
        })
    }

    /// Builds the architecture and fills it with the parameters stored at
    /// `path`, placed on `device`.
    ///
    /// `.safetensors` checkpoints are read directly; any other extension is
    /// treated as a PyTorch state-dict pickle, the format the trained
    /// `deepfake_cnn_model.pkl` ships in.
    pub fn load(path: &Path, device: &Device) -> Result<Self, LoadError> {
        let vb = if path.extension().is_some_and(|ext| ext == "safetensors") {
            let raw = std::fs::read(path).map_err(|source| LoadError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            VarBuilder::from_buffered_safetensors(raw, DType::F32, device).map_err(|source| {
                LoadError::Checkpoint {
                    path: path.to_path_buf(),
                    source,
                }
            })?
        } else {
            VarBuilder::from_pth(path, DType::F32, device).map_err(|source| {
                LoadError::Checkpoint {
                    path: path.to_path_buf(),
                    source,
                }
            })?
        };

        Self::new(vb).map_err(|source| LoadError::Parameters {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ModuleT for MorphCnn {
    /// Forward pass; serving always runs with `train = false`, which keeps
    /// dropout as identity and batch norm on its running statistics.
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let xs = self.conv1.forward(xs)?.relu()?.max_pool2d(2)?;
        let xs = self.conv2.forward(&xs)?.relu()?.max_pool2d(2)?;
        let xs = self.conv3.forward(&xs)?.relu()?.max_pool2d(2)?;
        let xs = xs.flatten_from(1)?;
        let xs = self.fc1.forward(&xs)?;
        let xs = self.bn1.forward_t(&xs, train)?.relu()?;
        let xs = self.dropout1.forward_t(&xs, train)?;
        let xs = self.fc2.forward(&xs)?.relu()?;
        let xs = self.dropout2.forward_t(&xs, train)?;
        let xs = self.fc3.forward(&xs)?;
        candle_nn::ops::sigmoid(&xs)
    }
}
