//! GeoVPR library crate (used by the `geovpr` binary and integration tests).
//!
//! # Public API Surface
//!
//! ## Training Cycle
//! - [`TrainingCycleController`], [`TrainingReport`], [`EpochState`] - Epoch loop and early stopping
//! - [`EmbeddingCache`], [`CacheSnapshot`] - Versioned embeddings used for mining
//! - [`TripletMiner`], [`Triplet`] - Hardest positive and negatives per query
//! - [`BatchAssembler`], [`TripletBatch`], [`TripletLayout`] - Fixed-shape training batches
//! - [`LossDispatcher`], [`LossPolicy`] - Triplet / SARE losses with optional SOS
//!
//! ## Collaborators
//! - [`FeatureExtractor`], [`GeoLocalizationNet`] - Image to embedding
//! - [`GeoDataset`], [`SafetensorsSplit`] - Geo-tagged image splits
//! - [`RecallEvaluator`], [`KnnRecallEvaluator`] - Recall@K
//! - [`CheckpointStore`], [`FsCheckpointStore`] - Per-epoch checkpoints
//!
//! ## Configuration
//! - [`TrainConfig`], [`ConfigError`] - Immutable run settings and validation
//!
//! ## Test/Mock Support
//! Mock implementations are available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod batch;
pub mod cache;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod eval;
pub mod logging;
pub mod loss;
pub mod mining;
pub mod model;
pub mod optim;
pub mod trainer;

pub use batch::{BatchAssembler, BatchError, TripletBatch, TripletLayout};
pub use cache::{CacheError, CacheSnapshot, EmbeddingCache};
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, FsCheckpointStore};
pub use config::{Aggregation, ConfigError, DeviceKind, LossKind, OptimizerKind, TrainConfig};
pub use dataset::{DatasetError, GeoDataset, GeoIndex, Location, Query, SafetensorsSplit};
pub use eval::{EvalError, KnnRecallEvaluator, RecallEvaluator, Recalls};
pub use loss::{LossDispatcher, LossPolicy};
pub use mining::{MiningError, MiningPlan, Triplet, TripletMiner};
pub use model::{FeatureExtractor, GeoLocalizationNet, Mode, ModelError, select_device};
pub use optim::{Adam, NamedTensors, TrainOptimizer};
pub use trainer::{EpochState, TrainError, TrainingCycleController, TrainingReport};

#[cfg(any(test, feature = "mock"))]
pub use checkpoint::MemoryCheckpointStore;
#[cfg(any(test, feature = "mock"))]
pub use dataset::InMemoryDataset;
#[cfg(any(test, feature = "mock"))]
pub use eval::ScriptedEvaluator;
