use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::eval::Recalls;

/// Position of the selection recall (recall@5 with the default K list).
pub const SELECTION_POSITION: usize = 1;

/// Loop state carried from one epoch to the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochState {
    /// Last completed epoch (`0` before the first one).
    pub epoch_num: usize,
    pub best_r5: f32,
    pub not_improved_num: usize,
    /// Recalls of the last evaluation.
    pub recalls: Vec<f32>,
}

/// Outcome of one epoch's evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub is_best: bool,
    pub should_stop: bool,
}

impl EpochState {
    pub fn fresh() -> Self {
        Self::default()
    }

    /// State to continue from after `checkpoint`.
    ///
    /// The best recall never drops below the checkpoint's own selection recall.
    pub fn restore(checkpoint: &Checkpoint) -> Self {
        let current = checkpoint
            .recalls
            .get(SELECTION_POSITION)
            .copied()
            .unwrap_or_default();
        Self {
            epoch_num: checkpoint.epoch_num,
            best_r5: checkpoint.best_r5.max(current),
            not_improved_num: checkpoint.not_improved_num,
            recalls: checkpoint.recalls.clone(),
        }
    }

    pub fn next_epoch(&self) -> usize {
        self.epoch_num + 1
    }

    /// Records the evaluation of `epoch_num`. Only a strictly greater selection
    /// recall counts as an improvement.
    pub fn decide(&mut self, epoch_num: usize, recalls: &Recalls, patience: usize) -> Decision {
        let current = recalls.at(SELECTION_POSITION).unwrap_or_default();
        let is_best = current > self.best_r5;

        self.epoch_num = epoch_num;
        self.recalls = recalls.percentages();
        if is_best {
            self.best_r5 = current;
            self.not_improved_num = 0;
        } else {
            self.not_improved_num += 1;
        }

        Decision {
            is_best,
            should_stop: self.patience_exhausted(patience),
        }
    }

    /// True once `patience` epochs in a row failed to improve.
    pub fn patience_exhausted(&self, patience: usize) -> bool {
        self.not_improved_num >= patience
    }
}
