//! Command line arguments of the `geovpr` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Aggregation, DeviceKind, LossKind, OptimizerKind, TrainConfig};
use crate::constants;

/// Train and evaluate a visual geolocalization model with hard-negative mining.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Triplets per training batch; each holds a query, a positive and the negatives
    #[arg(long, default_value_t = constants::DEFAULT_TRAIN_BATCH_SIZE)]
    pub train_batch_size: usize,

    /// Batch size for inference (caching and testing)
    #[arg(long, default_value_t = constants::DEFAULT_INFER_BATCH_SIZE)]
    pub infer_batch_size: usize,

    /// Hard negatives per query in the loss
    #[arg(long, default_value_t = constants::DEFAULT_NEGS_NUM_PER_QUERY)]
    pub negs_num_per_query: usize,

    /// Random true negatives ranked per query to find the hardest ones
    #[arg(long, default_value_t = constants::DEFAULT_NEG_SAMPLES_NUM)]
    pub neg_samples_num: usize,

    /// Queries mined per cache refresh
    #[arg(long, default_value_t = constants::DEFAULT_CACHE_REFRESH_RATE)]
    pub cache_refresh_rate: usize,

    /// Queries per epoch; must be a multiple of --cache-refresh-rate
    #[arg(long, default_value_t = constants::DEFAULT_QUERIES_PER_EPOCH)]
    pub queries_per_epoch: usize,

    #[arg(long, default_value_t = constants::DEFAULT_MARGIN)]
    pub margin: f32,

    #[arg(long, default_value_t = LossKind::Triplet)]
    pub loss: LossKind,

    /// Add the second-order similarity regularizer
    #[arg(long)]
    pub sos: bool,

    #[arg(long, default_value_t = constants::DEFAULT_SOS_LAMBDA)]
    pub sos_lambda: f32,

    /// Epochs without recall@5 improvement before stopping
    #[arg(long, default_value_t = constants::DEFAULT_PATIENCE)]
    pub patience: usize,

    #[arg(long, default_value_t = constants::DEFAULT_EPOCHS_NUM)]
    pub epochs_num: usize,

    /// K values for recall@K, ascending
    #[arg(long, num_args = 1.., value_delimiter = ',', default_values_t = constants::DEFAULT_RECALL_VALUES)]
    pub recall_values: Vec<usize>,

    #[arg(long, default_value_t = constants::DEFAULT_LEARNING_RATE)]
    pub lr: f64,

    #[arg(long, default_value_t = OptimizerKind::Adam)]
    pub optim: OptimizerKind,

    #[arg(long, default_value_t = Aggregation::AvgPool)]
    pub aggregation: Aggregation,

    #[arg(long, default_value_t = constants::DEFAULT_FEATURES_DIM)]
    pub features_dim: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Batches prefetched in the background; 0 builds them inline
    #[arg(long, default_value_t = constants::DEFAULT_NUM_WORKERS)]
    pub num_workers: usize,

    /// Meters; training positives lie within this distance
    #[arg(long, default_value_t = constants::DEFAULT_TRAIN_POSITIVES_DIST_THRESHOLD)]
    pub train_positives_dist_threshold: f64,

    /// Meters; validation/test positives lie within this distance
    #[arg(long, default_value_t = constants::DEFAULT_VAL_POSITIVE_DIST_THRESHOLD)]
    pub val_positive_dist_threshold: f64,

    #[arg(long, default_value_t = DeviceKind::Auto)]
    pub device: DeviceKind,

    /// Folder holding the datasets
    #[arg(long, default_value = "./datasets")]
    pub datasets_folder: PathBuf,

    #[arg(long, default_value = "pitts30k")]
    pub dataset_name: String,

    /// Run folder name under runs/
    #[arg(long, default_value = "default")]
    pub exp_name: String,

    /// Checkpoint (.json) to resume from
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Only evaluate the --resume checkpoint on the test split
    #[arg(long)]
    pub test_only: bool,
}

impl From<Cli> for TrainConfig {
    fn from(cli: Cli) -> Self {
        TrainConfig {
            train_batch_size: cli.train_batch_size,
            infer_batch_size: cli.infer_batch_size,
            negs_num_per_query: cli.negs_num_per_query,
            neg_samples_num: cli.neg_samples_num,
            cache_refresh_rate: cli.cache_refresh_rate,
            queries_per_epoch: cli.queries_per_epoch,
            margin: cli.margin,
            loss: cli.loss,
            sos: cli.sos,
            sos_lambda: cli.sos_lambda,
            patience: cli.patience,
            epochs_num: cli.epochs_num,
            recall_values: cli.recall_values,
            lr: cli.lr,
            optim: cli.optim,
            aggregation: cli.aggregation,
            features_dim: cli.features_dim,
            seed: cli.seed,
            num_workers: cli.num_workers,
            train_positives_dist_threshold: cli.train_positives_dist_threshold,
            val_positive_dist_threshold: cli.val_positive_dist_threshold,
            device: cli.device,
            datasets_folder: cli.datasets_folder,
            dataset_name: cli.dataset_name,
            exp_name: cli.exp_name,
            resume: cli.resume,
            test_only: cli.test_only,
        }
    }
}
