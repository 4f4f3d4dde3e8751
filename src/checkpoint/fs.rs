use std::fs;
use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_nn::VarMap;
use tracing::{debug, info};

use super::error::{CheckpointError, CheckpointResult};
use super::{
    BEST_CHECKPOINT_STEM, Checkpoint, CheckpointStore, STATE_EXTENSION, checkpoint_stem,
    optimizer_tensors, training_tensors, weights_path,
};
use crate::optim::NamedTensors;

/// Stores checkpoints as files inside a run folder.
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    dir: PathBuf,
}

impl FsCheckpointStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir
            .join(BEST_CHECKPOINT_STEM)
            .with_extension(STATE_EXTENSION)
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
        move |source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn save(
        &self,
        checkpoint: &Checkpoint,
        weights: &VarMap,
        optimizer: &NamedTensors,
        is_best: bool,
    ) -> CheckpointResult<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(Self::io_err(&self.dir))?;

        let path = self
            .dir
            .join(checkpoint_stem(checkpoint.epoch_num))
            .with_extension(STATE_EXTENSION);
        let json = serde_json::to_string_pretty(checkpoint).map_err(|source| CheckpointError::Parse {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(Self::io_err(&path))?;
        let tensors = training_tensors(weights, optimizer)?;
        candle_core::safetensors::save(&tensors, weights_path(&path))?;
        debug!(
            path = %path.display(),
            epoch = checkpoint.epoch_num,
            optimizer_buffers = optimizer.len(),
            "Checkpoint saved"
        );

        if is_best {
            let best = self.best_path();
            fs::copy(&path, &best).map_err(Self::io_err(&best))?;
            let best_weights = weights_path(&best);
            fs::copy(weights_path(&path), &best_weights).map_err(Self::io_err(&best_weights))?;
            info!(path = %best.display(), epoch = checkpoint.epoch_num, "Best model updated");
        }

        Ok(path)
    }

    fn load(&self, path: &Path) -> CheckpointResult<Checkpoint> {
        if !path.is_file() {
            return Err(CheckpointError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path).map_err(Self::io_err(path))?;
        serde_json::from_str(&raw).map_err(|source| CheckpointError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load_weights(&self, path: &Path, weights: &VarMap) -> CheckpointResult<()> {
        let file = weights_path(path);
        if !file.is_file() {
            return Err(CheckpointError::NotFound { path: file });
        }
        // VarMap clones share their variables; optimizer entries are skipped.
        let mut vars = weights.clone();
        vars.load(&file)?;
        Ok(())
    }

    fn load_optimizer(&self, path: &Path, device: &Device) -> CheckpointResult<NamedTensors> {
        let file = weights_path(path);
        if !file.is_file() {
            return Err(CheckpointError::NotFound { path: file });
        }
        Ok(optimizer_tensors(candle_core::safetensors::load(&file, device)?))
    }
}
