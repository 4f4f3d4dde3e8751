//! Packing mined triplets into training batches.
//!
//! A [`TripletBatch`] is one image tensor plus the [`TripletLayout`] describing
//! which rows are queries, positives and negatives. With `num_workers > 0`
//! batches are prefetched on a scoped thread while the consumer trains.

pub mod error;
pub mod layout;


pub use error::{BatchError, BatchResult};
pub use layout::TripletLayout;

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use candle_core::Tensor;
use tracing::{debug, trace};

use crate::config::TrainConfig;
use crate::dataset::GeoDataset;
use crate::mining::Triplet;

/// Images of `batch_size` triplets, `[B * (2 + N), C, H, W]`.
#[derive(Debug, Clone)]
pub struct TripletBatch {
    pub images: Tensor,
    pub layout: Arc<TripletLayout>,
}

#[derive(Debug, Clone)]
pub struct BatchAssembler {
    layout: Arc<TripletLayout>,
    num_workers: usize,
}

impl BatchAssembler {
    pub fn new(config: &TrainConfig) -> Self {
        Self {
            layout: Arc::new(TripletLayout::new(
                config.train_batch_size,
                config.negs_num_per_query,
            )),
            num_workers: config.num_workers,
        }
    }

    pub fn layout(&self) -> &TripletLayout {
        &self.layout
    }

    /// Stacks the images of exactly `batch_size` triplets.
    pub fn assemble<D: GeoDataset + ?Sized>(
        &self,
        dataset: &D,
        triplets: &[Triplet],
    ) -> BatchResult<TripletBatch> {
        let expected = self.layout.batch_size();
        if triplets.len() != expected {
            return Err(BatchError::TripletCount {
                expected,
                actual: triplets.len(),
            });
        }

        let negs = self.layout.negs_num_per_query();
        let mut images = Vec::with_capacity(self.layout.images_len());
        for t in triplets {
            if t.negatives.len() != negs {
                return Err(BatchError::NegativeCount {
                    query: t.query,
                    expected: negs,
                    actual: t.negatives.len(),
                });
            }
            images.push(dataset.image(t.query)?);
            images.push(dataset.image(t.positive)?);
            for &n in &t.negatives {
                images.push(dataset.image(n)?);
            }
        }

        Ok(TripletBatch {
            images: Tensor::stack(&images, 0)?,
            layout: Arc::clone(&self.layout),
        })
    }

    /// Feeds every full batch of `triplets` to `consume`, in order.
    ///
    /// Returns the number of batches consumed. Stops at the first error from
    /// either side; with prefetching the producer exits once the receiver is gone.
    pub fn for_each_batch<D, F, E>(
        &self,
        dataset: &D,
        triplets: &[Triplet],
        mut consume: F,
    ) -> Result<usize, E>
    where
        D: GeoDataset + ?Sized,
        F: FnMut(TripletBatch) -> Result<(), E>,
        E: From<BatchError>,
    {
        let batch_size = self.layout.batch_size().max(1);
        let dropped = triplets.len() % batch_size;
        if dropped > 0 {
            debug!(dropped, "Dropping trailing partial batch");
        }

        if self.num_workers == 0 {
            let mut done = 0;
            for group in triplets.chunks_exact(batch_size) {
                consume(self.assemble(dataset, group)?)?;
                done += 1;
            }
            return Ok(done);
        }

        thread::scope(|scope| {
            let (tx, rx) = mpsc::sync_channel::<BatchResult<TripletBatch>>(self.num_workers);

            scope.spawn(move || {
                for group in triplets.chunks_exact(batch_size) {
                    let batch = self.assemble(dataset, group);
                    let failed = batch.is_err();
                    if tx.send(batch).is_err() || failed {
                        trace!("Batch producer stopping early");
                        break;
                    }
                }
            });

            let mut done = 0;
            for batch in rx {
                consume(batch?)?;
                done += 1;
            }
            Ok(done)
        })
    }
}
