//! `geovpr` training entrypoint.

use std::fs;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::info;

use geovpr::checkpoint::{CheckpointStore, FsCheckpointStore};
use geovpr::cli::Cli;
use geovpr::config::TrainConfig;
use geovpr::dataset::{GeoDataset, SafetensorsSplit};
use geovpr::eval::KnnRecallEvaluator;
use geovpr::logging;
use geovpr::model::{GeoLocalizationNet, select_device};
use geovpr::trainer::TrainingCycleController;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const CONFIG_FILENAME: &str = "config.json";

fn main() -> anyhow::Result<()> {
    let started_at = Local::now();
    let cli_config = TrainConfig::from(Cli::parse());
    cli_config.validate()?;
    cli_config.validate_paths()?;

    let output_folder = cli_config.output_folder(started_at);
    let store = FsCheckpointStore::new(&output_folder);

    // Hyperparameters of a resumed run come from its checkpoint.
    let config = match &cli_config.resume {
        Some(path) => {
            let saved = store
                .load(path)
                .with_context(|| format!("reading checkpoint {}", path.display()))?;
            let merged = TrainConfig::resumed_from(&saved.config, &cli_config);
            merged.validate()?;
            merged
        }
        None => cli_config,
    };

    logging::init(&output_folder)
        .with_context(|| format!("creating run folder {}", output_folder.display()))?;
    fs::write(
        output_folder.join(CONFIG_FILENAME),
        serde_json::to_string_pretty(&config)?,
    )?;
    info!(output_folder = %output_folder.display(), "Run started");
    info!(config = ?config, "Arguments");

    let device = select_device(config.device)?;
    let root = config.dataset_root();
    let test_ds = SafetensorsSplit::open(&root, &config.dataset_name, "test")?;
    info!(split = %test_ds.describe(), "Test set");

    let in_channels = test_ds.image(0)?.dim(0)?;
    let model = GeoLocalizationNet::new(&config, in_channels, &device)?;
    let evaluator = KnnRecallEvaluator::from_config(&config);
    let resume = config.resume.clone();
    let test_only = config.test_only;

    let mut controller = TrainingCycleController::new(config, model, evaluator, store)?;
    if let Some(path) = &resume {
        controller.restore(path)?;
    }

    if !test_only {
        let train_ds = SafetensorsSplit::open(&root, &controller.config().dataset_name, "train")?;
        let val_ds = SafetensorsSplit::open(&root, &controller.config().dataset_name, "val")?;

        let report = controller.train(&train_ds, &val_ds)?;
        info!(
            best_r5 = report.best_r5,
            epochs = report.last_epoch,
            stopped_early = report.stopped_early,
            elapsed_s = (Local::now() - started_at).num_seconds(),
            "Best R@5"
        );
    }

    let recalls = controller.test(&test_ds)?;
    info!(%recalls, "Finished");
    Ok(())
}
