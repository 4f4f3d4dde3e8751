use thiserror::Error;

use crate::dataset::DatasetError;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch needs {expected} triplets, got {actual}")]
    TripletCount { expected: usize, actual: usize },

    #[error("triplet for query {query} has {actual} negatives, expected {expected}")]
    NegativeCount {
        query: usize,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub type BatchResult<T> = Result<T, BatchError>;
