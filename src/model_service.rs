use crate::preprocess::DecodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("forward pass failed: {0}")]
    Forward(#[from] candle_core::Error),
}

/// Scores one uploaded image, returning the model's native probability
/// that the pictured face is genuine, in `[0,1]`.
pub trait ModelService: Send + Sync + 'static {
    fn score(&self, image: &[u8]) -> Result<f32, InferenceError>;
}
