use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset manifest not found at {path}")]
    ManifestNotFound { path: PathBuf },

    #[error("failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("image '{id}' listed in the manifest is missing from {path}")]
    ImageMissing { id: String, path: PathBuf },

    #[error("image '{id}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        id: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("image index {index} out of range for split with {len} images")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("failed to load images: {reason}")]
    ImageLoadFailed { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<candle_core::Error> for DatasetError {
    fn from(err: candle_core::Error) -> Self {
        DatasetError::ImageLoadFailed {
            reason: err.to_string(),
        }
    }
}

pub type DatasetResult<T> = Result<T, DatasetError>;
