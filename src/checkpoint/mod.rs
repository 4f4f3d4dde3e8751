//! Per-epoch training checkpoints.
//!
//! A checkpoint is the loop state plus the configuration it was trained with
//! (`model_<epoch>.json`) and a tensors file next to it
//! (`model_<epoch>.safetensors`) holding the model weights and, under the
//! `optim.` prefix, the optimizer buffers. The best epoch is also copied to
//! `best_model.*`.

pub mod error;
pub mod fs;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use error::{CheckpointError, CheckpointResult};
pub use fs::FsCheckpointStore;
#[cfg(any(test, feature = "mock"))]
pub use mock::MemoryCheckpointStore;

use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

use crate::config::{OptimizerKind, TrainConfig};
use crate::optim::NamedTensors;

pub const BEST_CHECKPOINT_STEM: &str = "best_model";
pub const STATE_EXTENSION: &str = "json";
pub const WEIGHTS_EXTENSION: &str = "safetensors";
/// Prefix of optimizer buffers in the tensors file.
pub const OPTIMIZER_PREFIX: &str = "optim.";

/// Loop state saved after every epoch. Optimizer buffers live in the tensors
/// file, so `optimizer` and `learning_rate` are enough to rebuild it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch_num: usize,
    /// Validation recalls of this epoch, in `config.recall_values` order.
    pub recalls: Vec<f32>,
    pub best_r5: f32,
    pub not_improved_num: usize,
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    pub config: TrainConfig,
}

/// File stem of the checkpoint saved after `epoch_num`.
pub fn checkpoint_stem(epoch_num: usize) -> String {
    format!("model_{epoch_num:02}")
}

/// Tensors file that belongs to a checkpoint state file.
pub fn weights_path(checkpoint: &Path) -> PathBuf {
    checkpoint.with_extension(WEIGHTS_EXTENSION)
}

/// Everything the tensors file holds: `weights` by variable name and
/// `optimizer` buffers under [`OPTIMIZER_PREFIX`].
pub fn training_tensors(weights: &VarMap, optimizer: &NamedTensors) -> CheckpointResult<NamedTensors> {
    let vars = weights.data().lock().map_err(|_| CheckpointError::LockPoisoned)?;
    let mut tensors: NamedTensors = vars
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
        .collect();
    for (name, tensor) in optimizer {
        tensors.insert(format!("{OPTIMIZER_PREFIX}{name}"), tensor.clone());
    }
    Ok(tensors)
}

/// Optimizer buffers among `tensors`, with the prefix stripped.
pub fn optimizer_tensors(tensors: NamedTensors) -> NamedTensors {
    tensors
        .into_iter()
        .filter_map(|(name, tensor)| {
            name.strip_prefix(OPTIMIZER_PREFIX)
                .map(|stripped| (stripped.to_string(), tensor))
        })
        .collect()
}

pub trait CheckpointStore {
    /// Persists `checkpoint` with the current `weights` and `optimizer`
    /// buffers, returning the state path.
    fn save(
        &self,
        checkpoint: &Checkpoint,
        weights: &VarMap,
        optimizer: &NamedTensors,
        is_best: bool,
    ) -> CheckpointResult<PathBuf>;

    fn load(&self, path: &Path) -> CheckpointResult<Checkpoint>;

    /// Overwrites every variable of `weights` with the values saved next to `path`.
    fn load_weights(&self, path: &Path, weights: &VarMap) -> CheckpointResult<()>;

    /// Optimizer buffers saved next to `path`, placed on `device`.
    fn load_optimizer(&self, path: &Path, device: &Device) -> CheckpointResult<NamedTensors>;
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for &T {
    fn save(
        &self,
        checkpoint: &Checkpoint,
        weights: &VarMap,
        optimizer: &NamedTensors,
        is_best: bool,
    ) -> CheckpointResult<PathBuf> {
        (**self).save(checkpoint, weights, optimizer, is_best)
    }

    fn load(&self, path: &Path) -> CheckpointResult<Checkpoint> {
        (**self).load(path)
    }

    fn load_weights(&self, path: &Path, weights: &VarMap) -> CheckpointResult<()> {
        (**self).load_weights(path, weights)
    }

    fn load_optimizer(&self, path: &Path, device: &Device) -> CheckpointResult<NamedTensors> {
        (**self).load_optimizer(path, device)
    }
}
