use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature extraction failed: {reason}")]
    InferenceFailed { reason: String },

    #[error("invalid input batch: expected [N, C, H, W], got {dims:?}")]
    InvalidInput { dims: Vec<usize> },

    #[error("invalid model configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl From<candle_core::Error> for ModelError {
    fn from(err: candle_core::Error) -> Self {
        ModelError::InferenceFailed {
            reason: err.to_string(),
        }
    }
}
