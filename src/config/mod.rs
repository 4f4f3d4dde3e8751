//! Immutable training configuration.
//!
//! A [`TrainConfig`] is built once (by the CLI, from a checkpoint, or from
//! [`TrainConfig::default`]), validated, and then passed by reference into every
//! component constructor. Nothing mutates it after [`TrainConfig::validate`] succeeds.

pub mod error;


pub use error::ConfigError;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::constants::{self, images_per_triplet};
use crate::loss::LossPolicy;

/// Loss selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// Margin triplet loss.
    #[default]
    Triplet,
    /// SARE with all negatives of a query in one softmax.
    SareJoint,
    /// SARE with one softmax per (query, positive, negative) triple.
    SareInd,
}

impl LossKind {
    const EXPECTED: &'static str = "triplet, sare_joint, sare_ind";
}

impl FromStr for LossKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "triplet" => Ok(Self::Triplet),
            "sare_joint" => Ok(Self::SareJoint),
            "sare_ind" => Ok(Self::SareInd),
            _ => Err(ConfigError::UnknownVariant {
                option: "loss",
                value: s.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Triplet => "triplet",
            Self::SareJoint => "sare_joint",
            Self::SareInd => "sare_ind",
        })
    }
}

/// Optimizer selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "sgd" => Ok(Self::Sgd),
            _ => Err(ConfigError::UnknownVariant {
                option: "optim",
                value: s.to_string(),
                expected: "adam, sgd",
            }),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Adam => "adam",
            Self::Sgd => "sgd",
        })
    }
}

/// Spatial aggregation applied to the backbone feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    AvgPool,
    /// Generalized-mean pooling.
    Gem,
}

impl FromStr for Aggregation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avg_pool" | "avg" => Ok(Self::AvgPool),
            "gem" => Ok(Self::Gem),
            _ => Err(ConfigError::UnknownVariant {
                option: "aggregation",
                value: s.to_string(),
                expected: "avg_pool, gem",
            }),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AvgPool => "avg_pool",
            Self::Gem => "gem",
        })
    }
}

/// Compute device preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// First accelerator compiled in (Metal, then CUDA), else CPU.
    #[default]
    Auto,
    Cpu,
}

impl FromStr for DeviceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "cuda" | "metal" | "gpu" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            _ => Err(ConfigError::UnknownVariant {
                option: "device",
                value: s.to_string(),
                expected: "auto, cpu",
            }),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
        })
    }
}

/// Training, evaluation and run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Triplets per training batch. Each triplet holds `2 + negs_num_per_query` images.
    pub train_batch_size: usize,
    /// Batch size for inference (cache refresh and evaluation).
    pub infer_batch_size: usize,
    /// Negatives kept per query in the loss.
    pub negs_num_per_query: usize,
    /// Random true negatives ranked per query to find the hardest ones.
    pub neg_samples_num: usize,
    /// Queries mined per cache refresh.
    pub cache_refresh_rate: usize,
    /// Queries per epoch. Must be a multiple of `cache_refresh_rate`.
    pub queries_per_epoch: usize,
    /// Triplet loss margin.
    pub margin: f32,
    pub loss: LossKind,
    /// Add the second-order similarity regularizer.
    pub sos: bool,
    pub sos_lambda: f32,
    /// Epochs without recall improvement before stopping.
    pub patience: usize,
    /// Maximum number of epochs.
    pub epochs_num: usize,
    /// Ordered K values for recall@K. The second one drives early stopping.
    pub recall_values: Vec<usize>,
    pub lr: f64,
    pub optim: OptimizerKind,
    pub aggregation: Aggregation,
    /// Output embedding dimension.
    pub features_dim: usize,
    pub seed: u64,
    /// Prefetch depth for batch assembly. `0` assembles inline.
    pub num_workers: usize,
    /// Meters. Training positives are database images at most this far from the query.
    pub train_positives_dist_threshold: f64,
    /// Meters. Validation/test positives; beyond it an image is a true negative.
    pub val_positive_dist_threshold: f64,
    pub device: DeviceKind,
    pub datasets_folder: PathBuf,
    pub dataset_name: String,
    pub exp_name: String,
    /// Checkpoint to resume from (or to evaluate with `test_only`).
    pub resume: Option<PathBuf>,
    pub test_only: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_batch_size: constants::DEFAULT_TRAIN_BATCH_SIZE,
            infer_batch_size: constants::DEFAULT_INFER_BATCH_SIZE,
            negs_num_per_query: constants::DEFAULT_NEGS_NUM_PER_QUERY,
            neg_samples_num: constants::DEFAULT_NEG_SAMPLES_NUM,
            cache_refresh_rate: constants::DEFAULT_CACHE_REFRESH_RATE,
            queries_per_epoch: constants::DEFAULT_QUERIES_PER_EPOCH,
            margin: constants::DEFAULT_MARGIN,
            loss: LossKind::default(),
            sos: false,
            sos_lambda: constants::DEFAULT_SOS_LAMBDA,
            patience: constants::DEFAULT_PATIENCE,
            epochs_num: constants::DEFAULT_EPOCHS_NUM,
            recall_values: constants::DEFAULT_RECALL_VALUES.to_vec(),
            lr: constants::DEFAULT_LEARNING_RATE,
            optim: OptimizerKind::default(),
            aggregation: Aggregation::default(),
            features_dim: constants::DEFAULT_FEATURES_DIM,
            seed: 0,
            num_workers: constants::DEFAULT_NUM_WORKERS,
            train_positives_dist_threshold: constants::DEFAULT_TRAIN_POSITIVES_DIST_THRESHOLD,
            val_positive_dist_threshold: constants::DEFAULT_VAL_POSITIVE_DIST_THRESHOLD,
            device: DeviceKind::default(),
            datasets_folder: PathBuf::from("./datasets"),
            dataset_name: "pitts30k".to_string(),
            exp_name: "default".to_string(),
            resume: None,
            test_only: false,
        }
    }
}

impl TrainConfig {
    /// Checks every invariant the training cycle relies on. Does not touch the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("train_batch_size", self.train_batch_size),
            ("infer_batch_size", self.infer_batch_size),
            ("negs_num_per_query", self.negs_num_per_query),
            ("cache_refresh_rate", self.cache_refresh_rate),
            ("queries_per_epoch", self.queries_per_epoch),
            ("epochs_num", self.epochs_num),
            ("patience", self.patience),
            ("features_dim", self.features_dim),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue { name });
            }
        }

        if !self.queries_per_epoch.is_multiple_of(self.cache_refresh_rate) {
            return Err(ConfigError::NotDivisible {
                queries_per_epoch: self.queries_per_epoch,
                cache_refresh_rate: self.cache_refresh_rate,
            });
        }

        if self.neg_samples_num < self.negs_num_per_query {
            return Err(ConfigError::TooFewNegativeSamples {
                neg_samples_num: self.neg_samples_num,
                negs_num_per_query: self.negs_num_per_query,
            });
        }

        if self.recall_values.len() < 2 {
            return Err(ConfigError::RecallValuesTooShort {
                len: self.recall_values.len(),
            });
        }
        let ascending = self.recall_values.windows(2).all(|w| w[0] < w[1]);
        if !ascending || self.recall_values[0] == 0 {
            return Err(ConfigError::RecallValuesUnordered {
                values: self.recall_values.clone(),
            });
        }

        for (name, value) in [
            (
                "train_positives_dist_threshold",
                self.train_positives_dist_threshold,
            ),
            (
                "val_positive_dist_threshold",
                self.val_positive_dist_threshold,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        if self.train_positives_dist_threshold > self.val_positive_dist_threshold {
            return Err(ConfigError::ThresholdsInverted {
                train: self.train_positives_dist_threshold,
                val: self.val_positive_dist_threshold,
            });
        }

        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(ConfigError::InvalidHyperparameter {
                name: "margin",
                value: self.margin as f64,
            });
        }
        if !self.sos_lambda.is_finite() || self.sos_lambda < 0.0 {
            return Err(ConfigError::InvalidHyperparameter {
                name: "sos_lambda",
                value: self.sos_lambda as f64,
            });
        }
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(ConfigError::InvalidHyperparameter {
                name: "lr",
                value: self.lr,
            });
        }

        if self.test_only && self.resume.is_none() {
            return Err(ConfigError::MissingModelForTest);
        }

        Ok(())
    }

    /// Validates paths (does not create directories).
    pub fn validate_paths(&self) -> Result<(), ConfigError> {
        if !self.datasets_folder.exists() {
            return Err(ConfigError::PathNotFound {
                path: self.datasets_folder.clone(),
            });
        }
        if !self.datasets_folder.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.datasets_folder.clone(),
            });
        }

        if let Some(ref path) = self.resume {
            if !path.exists() {
                return Err(ConfigError::PathNotFound { path: path.clone() });
            }
            if !path.is_file() {
                return Err(ConfigError::NotAFile { path: path.clone() });
            }
        }

        Ok(())
    }

    /// Cache refresh/mining passes per epoch.
    pub fn loops_num(&self) -> usize {
        self.queries_per_epoch.div_ceil(self.cache_refresh_rate)
    }

    /// Images per triplet: query, positive and negatives.
    pub fn images_per_triplet(&self) -> usize {
        images_per_triplet(self.negs_num_per_query)
    }

    /// Loss policy with its payload, selected once for the whole run.
    pub fn loss_policy(&self) -> LossPolicy {
        let sos_lambda = self.sos.then_some(self.sos_lambda);
        match self.loss {
            LossKind::Triplet => LossPolicy::Triplet {
                margin: self.margin,
                sos_lambda,
            },
            LossKind::SareJoint => LossPolicy::SareJoint { sos_lambda },
            LossKind::SareInd => LossPolicy::SareInd { sos_lambda },
        }
    }

    /// Directory of this dataset's splits.
    pub fn dataset_root(&self) -> PathBuf {
        self.datasets_folder
            .join(&self.dataset_name)
            .join("images")
    }

    /// Run folder: `runs/<exp_name>/<YYYY-MM-DD_HH-MM-SS>`.
    pub fn output_folder(&self, started_at: DateTime<Local>) -> PathBuf {
        Path::new("runs")
            .join(&self.exp_name)
            .join(started_at.format("%Y-%m-%d_%H-%M-%S").to_string())
    }

    /// Rebuilds the config of a resumed run.
    ///
    /// Model and mining hyperparameters come from the checkpoint so the network
    /// shape and the mining recipe cannot drift; run-level settings come from `current`.
    pub fn resumed_from(saved: &TrainConfig, current: &TrainConfig) -> TrainConfig {
        TrainConfig {
            epochs_num: current.epochs_num,
            patience: current.patience,
            num_workers: current.num_workers,
            infer_batch_size: current.infer_batch_size,
            device: current.device,
            datasets_folder: current.datasets_folder.clone(),
            dataset_name: current.dataset_name.clone(),
            exp_name: current.exp_name.clone(),
            resume: current.resume.clone(),
            test_only: current.test_only,
            ..saved.clone()
        }
    }

    /// Small, fast settings for unit and integration tests.
    #[cfg(any(test, feature = "mock"))]
    pub fn for_testing() -> Self {
        Self {
            train_batch_size: 2,
            infer_batch_size: 4,
            negs_num_per_query: 2,
            neg_samples_num: 5,
            cache_refresh_rate: 2,
            queries_per_epoch: 4,
            epochs_num: 3,
            patience: 3,
            recall_values: vec![1, 5],
            lr: 1e-3,
            features_dim: 8,
            num_workers: 0,
            device: DeviceKind::Cpu,
            ..Default::default()
        }
    }
}
