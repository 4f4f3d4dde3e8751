//! Epoch loop: refresh the cache, mine, train on batches, evaluate, decide.
//!
//! ```text
//! for epoch in next..=epochs_num
//!     for loop in 1..=loops_num
//!         sample queries → plan → refresh cache → mine triplets
//!         for batch: embed (train) → loss → backward_step
//!     evaluate val → decide → checkpoint → stop on patience
//! ```

pub mod error;
pub mod state;


pub use error::{TrainError, TrainResult};
pub use state::{Decision, EpochState};

use std::path::Path;
use std::time::Instant;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch::BatchAssembler;
use crate::cache::EmbeddingCache;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::TrainConfig;
use crate::dataset::GeoDataset;
use crate::eval::{RecallEvaluator, Recalls};
use crate::loss::LossDispatcher;
use crate::mining::TripletMiner;
use crate::model::{FeatureExtractor, Mode};
use crate::optim::TrainOptimizer;

/// Generator for one epoch. Reseeding per epoch makes a resumed run sample
/// exactly like an uninterrupted one.
pub fn epoch_rng(seed: u64, epoch_num: usize) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed ^ (epoch_num as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Summary of one [`TrainingCycleController::train`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    /// Last epoch that was run (or the resumed epoch if none ran).
    pub last_epoch: usize,
    /// Epochs run by this call.
    pub epochs_trained: usize,
    pub best_r5: f32,
    pub stopped_early: bool,
    pub last_recalls: Option<Recalls>,
    /// Mean batch loss of every epoch run by this call; `None` when an epoch
    /// mined no full batch.
    pub epoch_losses: Vec<Option<f32>>,
}

pub struct TrainingCycleController<M, E, S> {
    config: TrainConfig,
    model: M,
    optimizer: TrainOptimizer,
    evaluator: E,
    store: S,
    cache: EmbeddingCache,
    assembler: BatchAssembler,
    dispatcher: LossDispatcher,
    state: EpochState,
}

impl<M, E, S> TrainingCycleController<M, E, S>
where
    M: FeatureExtractor,
    E: RecallEvaluator,
    S: CheckpointStore,
{
    pub fn new(config: TrainConfig, model: M, evaluator: E, store: S) -> TrainResult<Self> {
        config.validate()?;
        let optimizer = TrainOptimizer::new(config.optim, model.var_map(), config.lr)?;

        Ok(Self {
            cache: EmbeddingCache::new(model.features_dim(), config.infer_batch_size),
            assembler: BatchAssembler::new(&config),
            dispatcher: LossDispatcher::new(config.loss_policy()),
            state: EpochState::fresh(),
            config,
            model,
            optimizer,
            evaluator,
            store,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn state(&self) -> &EpochState {
        &self.state
    }

    /// Cache refreshes done so far.
    pub fn cache_version(&self) -> u64 {
        self.cache.version()
    }

    /// Loads weights, optimizer buffers and loop state from a checkpoint
    /// written by `store`.
    pub fn restore(&mut self, path: &Path) -> TrainResult<()> {
        let checkpoint = self.store.load(path)?;
        self.store.load_weights(path, self.model.var_map())?;

        let buffers = self.store.load_optimizer(path, self.model.device())?;
        let mut optimizer = TrainOptimizer::new(
            checkpoint.optimizer,
            self.model.var_map(),
            checkpoint.learning_rate,
        )?;
        optimizer.load_state(&buffers)?;
        self.optimizer = optimizer;

        self.state = EpochState::restore(&checkpoint);
        debug!(
            epoch = self.state.epoch_num,
            best_r5 = self.state.best_r5,
            recalls = ?checkpoint.recalls,
            optimizer_buffers = buffers.len(),
            "Loaded model from checkpoint"
        );
        Ok(())
    }

    /// Trains until `epochs_num` or until validation stops improving for `patience` epochs.
    pub fn train(&mut self, train: &dyn GeoDataset, val: &dyn GeoDataset) -> TrainResult<TrainingReport> {
        let started = Instant::now();
        let miner = TripletMiner::new(train, &self.config)?;
        info!(
            train = %train.describe(),
            val = %val.describe(),
            loss = self.dispatcher.policy().name(),
            optimizer = %self.optimizer.kind(),
            features_dim = self.model.features_dim(),
            "Training started"
        );

        let mut report = TrainingReport {
            last_epoch: self.state.epoch_num,
            epochs_trained: 0,
            best_r5: self.state.best_r5,
            stopped_early: false,
            last_recalls: None,
            epoch_losses: Vec::new(),
        };

        if self.state.patience_exhausted(self.config.patience) {
            info!(
                epoch = self.state.epoch_num,
                not_improved = self.state.not_improved_num,
                patience = self.config.patience,
                "Checkpoint already stopped early, nothing to train"
            );
            report.stopped_early = true;
            return Ok(report);
        }

        for epoch_num in self.state.next_epoch()..=self.config.epochs_num {
            info!(epoch = epoch_num, "Start training epoch");
            let epoch_started = Instant::now();

            let mean_loss = self.run_epoch(epoch_num, &miner, train)?;
            info!(
                epoch = epoch_num,
                elapsed_s = epoch_started.elapsed().as_secs(),
                mean_loss,
                "Finished epoch"
            );

            let recalls = self.evaluator.evaluate(&self.model, val)?;
            info!(epoch = epoch_num, split = val.name(), %recalls, "Recalls on val set");

            let previous_best = self.state.best_r5;
            let decision = self.state.decide(epoch_num, &recalls, self.config.patience);
            let current = recalls.at(state::SELECTION_POSITION).unwrap_or_default();
            if decision.is_best {
                info!(previous_best, current, "Improved");
            } else {
                info!(
                    not_improved = self.state.not_improved_num,
                    patience = self.config.patience,
                    best = self.state.best_r5,
                    current,
                    "Not improved"
                );
            }

            let checkpoint = Checkpoint {
                epoch_num,
                recalls: self.state.recalls.clone(),
                best_r5: self.state.best_r5,
                not_improved_num: self.state.not_improved_num,
                optimizer: self.optimizer.kind(),
                learning_rate: self.optimizer.learning_rate(),
                config: self.config.clone(),
            };
            self.store.save(
                &checkpoint,
                self.model.var_map(),
                &self.optimizer.state()?,
                decision.is_best,
            )?;

            report.last_epoch = epoch_num;
            report.epochs_trained += 1;
            report.epoch_losses.push(mean_loss);
            report.last_recalls = Some(recalls);

            if decision.should_stop {
                info!(
                    not_improved = self.state.not_improved_num,
                    "Performance did not improve, stop training"
                );
                report.stopped_early = true;
                break;
            }
        }

        report.best_r5 = self.state.best_r5;
        info!(
            best_r5 = report.best_r5,
            epochs = report.last_epoch,
            elapsed_s = started.elapsed().as_secs(),
            "Training finished"
        );
        Ok(report)
    }

    /// Recall@K of the current weights on `dataset`.
    pub fn test(&self, dataset: &dyn GeoDataset) -> TrainResult<Recalls> {
        let recalls = self.evaluator.evaluate(&self.model, dataset)?;
        info!(split = %dataset.describe(), %recalls, "Recalls on test set");
        Ok(recalls)
    }

    /// Runs every cache/mining loop of one epoch and returns the mean batch
    /// loss, or `None` if no batch was trained.
    fn run_epoch(
        &mut self,
        epoch_num: usize,
        miner: &TripletMiner,
        train: &dyn GeoDataset,
    ) -> TrainResult<Option<f32>> {
        let mut rng = epoch_rng(self.config.seed, epoch_num);
        let loops_num = self.config.loops_num();
        let mut losses: Vec<f32> = Vec::new();

        for loop_num in 1..=loops_num {
            let queries = miner.sample_queries(&mut rng);
            let plan = miner.plan(&queries, &mut rng);
            let snapshot = self.cache.refresh(&self.model, train, &plan.pool())?;
            let triplets = miner.compute_triplets(&plan, &snapshot)?;

            let model = &self.model;
            let dispatcher = &self.dispatcher;
            let optimizer = &mut self.optimizer;
            let batches = self.assembler.for_each_batch(train, &triplets, |batch| {
                let features = model.embed(&batch.images, Mode::Train)?;
                let loss = dispatcher.compute(&features, &batch.layout)?;
                optimizer.backward_step(&loss)?;
                losses.push(loss.to_scalar::<f32>()?);
                Ok::<_, TrainError>(())
            })?;

            debug!(
                epoch = epoch_num,
                loop_num,
                loops_num,
                triplets = triplets.len(),
                batches,
                cache_version = snapshot.version(),
                last_loss = losses.last().copied().unwrap_or_default(),
                "Cache loop finished"
            );
        }

        if losses.is_empty() {
            warn!(epoch = epoch_num, "No full batch could be mined this epoch");
            return Ok(None);
        }
        Ok(Some(losses.iter().sum::<f32>() / losses.len() as f32))
    }
}
