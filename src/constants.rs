//! Cross-cutting, shared constants.
//!
//! Defaults mirror the benchmark settings the training recipe was tuned with.
//! Prefer deriving secondary values (e.g. images per triplet) from primary ones to avoid drift.

pub const DEFAULT_TRAIN_BATCH_SIZE: usize = 4;
pub const DEFAULT_INFER_BATCH_SIZE: usize = 16;
pub const DEFAULT_NEGS_NUM_PER_QUERY: usize = 10;
pub const DEFAULT_NEG_SAMPLES_NUM: usize = 1000;

pub const DEFAULT_CACHE_REFRESH_RATE: usize = 1000;
pub const DEFAULT_QUERIES_PER_EPOCH: usize = 5000;

pub const DEFAULT_MARGIN: f32 = 0.1;
pub const DEFAULT_SOS_LAMBDA: f32 = 5.0;

pub const DEFAULT_EPOCHS_NUM: usize = 50;
pub const DEFAULT_PATIENCE: usize = 3;
pub const DEFAULT_LEARNING_RATE: f64 = 1e-5;

pub const DEFAULT_RECALL_VALUES: [usize; 4] = [1, 5, 10, 20];

/// Positives for training must lie within this many meters of the query.
pub const DEFAULT_TRAIN_POSITIVES_DIST_THRESHOLD: f64 = 10.0;
/// Validation/test positives lie within this many meters; anything farther is a true negative.
pub const DEFAULT_VAL_POSITIVE_DIST_THRESHOLD: f64 = 25.0;

pub const DEFAULT_FEATURES_DIM: usize = 256;
pub const DEFAULT_NUM_WORKERS: usize = 8;

/// Query, positive and the negatives of one triplet.
pub const fn images_per_triplet(negs_num_per_query: usize) -> usize {
    2 + negs_num_per_query
}

/// Number of images in one training batch.
pub const fn images_per_batch(train_batch_size: usize, negs_num_per_query: usize) -> usize {
    train_batch_size * images_per_triplet(negs_num_per_query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_batch_shape() {
        assert_eq!(images_per_triplet(DEFAULT_NEGS_NUM_PER_QUERY), 12);
        assert_eq!(
            images_per_batch(DEFAULT_TRAIN_BATCH_SIZE, DEFAULT_NEGS_NUM_PER_QUERY),
            48
        );
    }

    #[test]
    fn test_default_thresholds_nest() {
        assert!(DEFAULT_VAL_POSITIVE_DIST_THRESHOLD >= DEFAULT_TRAIN_POSITIVES_DIST_THRESHOLD);
    }
}
