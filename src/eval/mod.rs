//! Recall@K evaluation.
//!
//! [`KnnRecallEvaluator`] embeds a whole split, retrieves the nearest database
//! images for every query by brute-force L2 search and counts a query as found
//! at K when any of its top-K results lies within the positive distance threshold.

pub mod recalls;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use recalls::Recalls;
#[cfg(any(test, feature = "mock"))]
pub use mock::ScriptedEvaluator;

use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheError, EmbeddingCache, squared_l2};
use crate::config::TrainConfig;
use crate::dataset::{DatasetError, GeoDataset};
use crate::model::FeatureExtractor;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("embedding split failed: {0}")]
    Embedding(#[from] CacheError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("split {name} has no database images")]
    EmptyDatabase { name: String },
}

/// Produces recall@K for every configured K on a split.
pub trait RecallEvaluator {
    fn evaluate(
        &self,
        model: &dyn FeatureExtractor,
        dataset: &dyn GeoDataset,
    ) -> Result<Recalls, EvalError>;
}

#[derive(Debug, Clone)]
pub struct KnnRecallEvaluator {
    recall_values: Vec<usize>,
    positive_dist_threshold: f64,
    infer_batch_size: usize,
}

impl KnnRecallEvaluator {
    pub fn new(recall_values: Vec<usize>, positive_dist_threshold: f64, infer_batch_size: usize) -> Self {
        Self {
            recall_values,
            positive_dist_threshold,
            infer_batch_size,
        }
    }

    pub fn from_config(config: &TrainConfig) -> Self {
        Self::new(
            config.recall_values.clone(),
            config.val_positive_dist_threshold,
            config.infer_batch_size,
        )
    }
}

impl RecallEvaluator for KnnRecallEvaluator {
    fn evaluate(
        &self,
        model: &dyn FeatureExtractor,
        dataset: &dyn GeoDataset,
    ) -> Result<Recalls, EvalError> {
        let started = Instant::now();
        let database_len = dataset.database_len();
        if database_len == 0 {
            return Err(EvalError::EmptyDatabase {
                name: dataset.name().to_string(),
            });
        }

        let mut cache = EmbeddingCache::new(model.features_dim(), self.infer_batch_size);
        let all: Vec<usize> = (0..dataset.len()).collect();
        let snapshot = cache.refresh(model, dataset, &all)?;
        let geo = dataset.geo_index()?;

        let max_k = self
            .recall_values
            .iter()
            .copied()
            .max()
            .unwrap_or(1)
            .min(database_len);
        let mut found = vec![0usize; self.recall_values.len()];

        for q in 0..dataset.queries_len() {
            let query = dataset.query(q)?;
            let Some(query_embedding) = snapshot.get(query.index) else {
                continue;
            };

            let mut ranked: Vec<(usize, f32)> = (0..database_len)
                .filter_map(|i| Some((i, squared_l2(query_embedding, snapshot.get(i)?))))
                .collect();
            let by_distance = |a: &(usize, f32), b: &(usize, f32)| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0));
            if max_k < ranked.len() {
                ranked.select_nth_unstable_by(max_k, by_distance);
                ranked.truncate(max_k);
            }
            ranked.sort_by(by_distance);

            let positives = geo.within(&query.location, self.positive_dist_threshold);
            // Recall is cumulative: a hit at the first K counts for every larger K.
            if let Some(first) = self
                .recall_values
                .iter()
                .position(|&k| ranked.iter().take(k).any(|(i, _)| positives.contains(i)))
            {
                for hit in &mut found[first..] {
                    *hit += 1;
                }
            }
        }

        let queries = dataset.queries_len().max(1) as f32;
        let recalls = Recalls::new(
            self.recall_values
                .iter()
                .zip(found)
                .map(|(&k, hits)| (k, hits as f32 / queries * 100.0))
                .collect(),
        );

        debug!(
            split = dataset.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            %recalls,
            "Evaluated split"
        );
        Ok(recalls)
    }
}
