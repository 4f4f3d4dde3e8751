use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use candle_core::Tensor;
use tracing::debug;

use super::error::{CacheError, CacheResult};
use super::snapshot::CacheSnapshot;
use crate::dataset::GeoDataset;
use crate::model::{FeatureExtractor, Mode};

/// Owner of the current [`CacheSnapshot`].
///
/// `refresh` takes `&mut self`, so no mining pass can hold the cache while it is
/// being rebuilt; miners keep the `Arc` of the snapshot they were given.
#[derive(Debug)]
pub struct EmbeddingCache {
    current: Arc<CacheSnapshot>,
    infer_batch_size: usize,
}

impl EmbeddingCache {
    pub fn new(features_dim: usize, infer_batch_size: usize) -> Self {
        Self {
            current: Arc::new(CacheSnapshot::empty(features_dim)),
            infer_batch_size: infer_batch_size.max(1),
        }
    }

    /// Latest snapshot.
    #[inline]
    pub fn current(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&self.current)
    }

    /// Number of completed refreshes.
    #[inline]
    pub fn version(&self) -> u64 {
        self.current.version()
    }

    /// Recomputes embeddings for every image in `pool` with the current weights.
    ///
    /// Runs the extractor in inference mode in batches of `infer_batch_size`.
    /// The new snapshot replaces the previous one only after every batch succeeded.
    pub fn refresh<M, D>(
        &mut self,
        model: &M,
        dataset: &D,
        pool: &[usize],
    ) -> CacheResult<Arc<CacheSnapshot>>
    where
        M: FeatureExtractor + ?Sized,
        D: GeoDataset + ?Sized,
    {
        let started = Instant::now();
        let dim = model.features_dim();

        let mut seen = HashSet::with_capacity(pool.len());
        let indices: Vec<usize> = pool.iter().copied().filter(|i| seen.insert(*i)).collect();

        let mut data = Vec::with_capacity(indices.len() * dim);
        for chunk in indices.chunks(self.infer_batch_size) {
            let images = chunk
                .iter()
                .map(|&i| dataset.image(i))
                .collect::<Result<Vec<_>, _>>()?;
            let batch = Tensor::stack(&images, 0)?;
            let features = model.embed(&batch, Mode::Inference)?;

            if features.dims() != [chunk.len(), dim] {
                return Err(CacheError::ShapeMismatch {
                    rows: chunk.len(),
                    dim,
                    actual: features.dims().to_vec(),
                });
            }
            data.extend(features.flatten_all()?.to_vec1::<f32>()?);
        }

        let snapshot = Arc::new(CacheSnapshot::new(
            self.current.version() + 1,
            dim,
            indices,
            data,
        ));
        debug!(
            version = snapshot.version(),
            pool = snapshot.len(),
            bytes = snapshot.memory_bytes(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Embedding cache refreshed"
        );

        self.current = Arc::clone(&snapshot);
        Ok(snapshot)
    }
}
