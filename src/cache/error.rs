use thiserror::Error;

use crate::dataset::DatasetError;
use crate::model::ModelError;

#[derive(Debug, Error)]
/// Errors returned by a cache refresh. All of them abort the mining cycle.
pub enum CacheError {
    /// Feature extraction failed.
    #[error("feature extraction failed during cache refresh: {0}")]
    Model(#[from] ModelError),

    /// An image of the pool could not be read.
    #[error("failed to read pool image: {0}")]
    Dataset(#[from] DatasetError),

    /// The extractor returned a tensor of unexpected shape.
    #[error("extractor returned shape {actual:?}, expected [{rows}, {dim}]")]
    ShapeMismatch {
        rows: usize,
        dim: usize,
        actual: Vec<usize>,
    },
}

impl From<candle_core::Error> for CacheError {
    fn from(err: candle_core::Error) -> Self {
        CacheError::Model(ModelError::from(err))
    }
}

/// Convenience result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
