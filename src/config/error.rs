//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or validating a [`TrainConfig`](super::TrainConfig).
///
/// Every variant is fatal and is reported before any training cycle starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A size-like option that must be positive was zero.
    #[error("{name} must be greater than zero")]
    ZeroValue { name: &'static str },

    /// `queries_per_epoch` is not a multiple of `cache_refresh_rate`.
    #[error(
        "queries_per_epoch ({queries_per_epoch}) must be divisible by cache_refresh_rate ({cache_refresh_rate})"
    )]
    NotDivisible {
        queries_per_epoch: usize,
        cache_refresh_rate: usize,
    },

    /// The random negative pool is smaller than the number of negatives kept per query.
    #[error(
        "neg_samples_num ({neg_samples_num}) must be at least negs_num_per_query ({negs_num_per_query})"
    )]
    TooFewNegativeSamples {
        neg_samples_num: usize,
        negs_num_per_query: usize,
    },

    /// Early stopping reads the second recall value, so at least two are required.
    #[error("recall_values needs at least 2 entries, got {len}")]
    RecallValuesTooShort { len: usize },

    /// Recall values must be strictly ascending and non-zero.
    #[error("recall_values must be strictly ascending positive integers: {values:?}")]
    RecallValuesUnordered { values: Vec<usize> },

    /// A distance threshold was negative or not finite.
    #[error("invalid distance threshold {name} = {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    /// Training positives must be a subset of the validation positives.
    #[error(
        "train_positives_dist_threshold ({train}) must not exceed val_positive_dist_threshold ({val})"
    )]
    ThresholdsInverted { train: f64, val: f64 },

    /// A floating point hyperparameter was out of range.
    #[error("invalid {name}: {value}")]
    InvalidHyperparameter { name: &'static str, value: f64 },

    /// An enumerated option had an unrecognized value.
    #[error("unknown {option} '{value}', expected one of: {expected}")]
    UnknownVariant {
        option: &'static str,
        value: String,
        expected: &'static str,
    },

    /// Evaluate-only runs need a trained model to load.
    #[error("no model specified for testing: set --resume when --test-only is used")]
    MissingModelForTest,

    /// Specified path does not exist on the filesystem.
    #[error("path does not exist: {path}")]
    PathNotFound { path: PathBuf },

    /// Path exists but is not a directory (when a directory was expected).
    #[error("path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Path exists but is not a file (when a file was expected).
    #[error("path is not a file: {path}")]
    NotAFile { path: PathBuf },
}
