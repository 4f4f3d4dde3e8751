//! Evaluator returning a fixed recall sequence.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{EvalError, RecallEvaluator, Recalls};
use crate::dataset::GeoDataset;
use crate::model::FeatureExtractor;

/// Returns `sequence[n]` on the n-th call, repeating the last entry afterwards.
#[derive(Debug)]
pub struct ScriptedEvaluator {
    recall_values: Vec<usize>,
    sequence: Vec<Vec<f32>>,
    calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new(recall_values: Vec<usize>, sequence: Vec<Vec<f32>>) -> Self {
        Self {
            recall_values,
            sequence,
            calls: AtomicUsize::new(0),
        }
    }

    /// Scripted recall@5 values, with recall@1 set to half of each.
    pub fn from_r5(sequence: &[f32]) -> Self {
        Self::new(
            vec![1, 5],
            sequence.iter().map(|&r5| vec![r5 / 2.0, r5]).collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl RecallEvaluator for ScriptedEvaluator {
    fn evaluate(
        &self,
        _model: &dyn FeatureExtractor,
        _dataset: &dyn GeoDataset,
    ) -> Result<Recalls, EvalError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let percentages = self
            .sequence
            .get(call)
            .or_else(|| self.sequence.last())
            .cloned()
            .unwrap_or_default();
        Ok(Recalls::from_percentages(&self.recall_values, &percentages))
    }
}
