use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: {path}")]
    NotFound { path: PathBuf },

    #[error("checkpoint io failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint weights failed: {reason}")]
    Weights { reason: String },

    #[error("checkpoint store lock poisoned")]
    LockPoisoned,
}

impl From<candle_core::Error> for CheckpointError {
    fn from(err: candle_core::Error) -> Self {
        CheckpointError::Weights {
            reason: err.to_string(),
        }
    }
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;
