use thiserror::Error;

use crate::batch::BatchError;
use crate::cache::CacheError;
use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::dataset::DatasetError;
use crate::eval::EvalError;
use crate::mining::MiningError;
use crate::model::ModelError;

/// Any failure that aborts a training or evaluation run.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("cache refresh failed: {0}")]
    Cache(#[from] CacheError),

    #[error("mining failed: {0}")]
    Mining(#[from] MiningError),

    #[error("batch assembly failed: {0}")]
    Batch(#[from] BatchError),

    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub type TrainResult<T> = Result<T, TrainError>;
