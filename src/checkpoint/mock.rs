//! Checkpoint store kept in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use candle_core::Device;
use candle_nn::VarMap;

use super::error::{CheckpointError, CheckpointResult};
use super::{
    BEST_CHECKPOINT_STEM, Checkpoint, CheckpointStore, STATE_EXTENSION, checkpoint_stem,
    optimizer_tensors, training_tensors,
};
use crate::optim::NamedTensors;

#[derive(Debug, Clone)]
struct Saved {
    checkpoint: Checkpoint,
    /// Deep copies laid out like the tensors file.
    tensors: NamedTensors,
}

/// Keeps every saved checkpoint under a virtual `memory/` path.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    saved: RwLock<HashMap<PathBuf, Saved>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_for(stem: &str) -> PathBuf {
        Path::new("memory").join(stem).with_extension(STATE_EXTENSION)
    }

    pub fn best_path() -> PathBuf {
        Self::path_for(BEST_CHECKPOINT_STEM)
    }

    /// Epochs saved so far, ascending (the best copy is not counted).
    pub fn epochs(&self) -> Vec<usize> {
        let best = Self::best_path();
        let mut epochs: Vec<usize> = self
            .saved
            .read()
            .map(|saved| {
                saved
                    .iter()
                    .filter(|(path, _)| **path != best)
                    .map(|(_, s)| s.checkpoint.epoch_num)
                    .collect()
            })
            .unwrap_or_default();
        epochs.sort_unstable();
        epochs
    }

    pub fn best(&self) -> Option<Checkpoint> {
        self.get(&Self::best_path())
    }

    fn entry(&self, path: &Path) -> CheckpointResult<Saved> {
        self.saved
            .read()
            .map_err(|_| CheckpointError::LockPoisoned)?
            .get(path)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound {
                path: path.to_path_buf(),
            })
    }

    pub fn get(&self, path: &Path) -> Option<Checkpoint> {
        self.saved
            .read()
            .ok()?
            .get(path)
            .map(|s| s.checkpoint.clone())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(
        &self,
        checkpoint: &Checkpoint,
        weights: &VarMap,
        optimizer: &NamedTensors,
        is_best: bool,
    ) -> CheckpointResult<PathBuf> {
        // Variables are updated in place, so keep copies rather than handles.
        let tensors = training_tensors(weights, optimizer)?
            .into_iter()
            .map(|(name, tensor)| Ok((name, tensor.copy()?)))
            .collect::<CheckpointResult<NamedTensors>>()?;
        let entry = Saved {
            checkpoint: checkpoint.clone(),
            tensors,
        };

        let path = Self::path_for(&checkpoint_stem(checkpoint.epoch_num));
        let mut saved = self.saved.write().map_err(|_| CheckpointError::LockPoisoned)?;
        if is_best {
            saved.insert(Self::best_path(), entry.clone());
        }
        saved.insert(path.clone(), entry);
        Ok(path)
    }

    fn load(&self, path: &Path) -> CheckpointResult<Checkpoint> {
        self.get(path).ok_or_else(|| CheckpointError::NotFound {
            path: path.to_path_buf(),
        })
    }

    fn load_weights(&self, path: &Path, weights: &VarMap) -> CheckpointResult<()> {
        let entry = self.entry(path)?;
        let vars = weights.data().lock().map_err(|_| CheckpointError::LockPoisoned)?;
        for (name, var) in vars.iter() {
            let tensor = entry.tensors.get(name).ok_or_else(|| CheckpointError::Weights {
                reason: format!("no saved tensor for {name}"),
            })?;
            var.set(&tensor.to_device(var.device())?)?;
        }
        Ok(())
    }

    fn load_optimizer(&self, path: &Path, device: &Device) -> CheckpointResult<NamedTensors> {
        optimizer_tensors(self.entry(path)?.tensors)
            .into_iter()
            .map(|(name, tensor)| Ok((name, tensor.to_device(device)?.copy()?)))
            .collect::<CheckpointResult<NamedTensors>>()
    }
}
