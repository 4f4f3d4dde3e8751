//! End-to-end training runs over on-disk splits.

mod common;

use candle_core::Device;
use geovpr::checkpoint::{BEST_CHECKPOINT_STEM, weights_path};
use geovpr::config::OptimizerKind;
use geovpr::{
    FsCheckpointStore, GeoDataset, GeoLocalizationNet, InMemoryDataset, KnnRecallEvaluator,
    LossKind, MemoryCheckpointStore, SafetensorsSplit, ScriptedEvaluator, TrainConfig,
    TrainingCycleController,
};

use common::fixtures::{DATASET_NAME, DatasetFixture};

fn open(config: &TrainConfig, split: &str) -> SafetensorsSplit {
    SafetensorsSplit::open(config.dataset_root(), DATASET_NAME, split).expect("split")
}

#[test]
fn test_train_then_evaluate_from_disk() {
    let fixture = DatasetFixture::new();
    let config = TrainConfig {
        epochs_num: 2,
        num_workers: 2,
        ..fixture.config()
    };
    config.validate_paths().unwrap();

    let (train, val, test) = (open(&config, "train"), open(&config, "val"), open(&config, "test"));
    assert_eq!(train.database_len(), 8);
    assert_eq!(val.queries_len(), 4);

    let model = GeoLocalizationNet::new(&config, 3, &Device::Cpu).unwrap();
    let store = FsCheckpointStore::new(fixture.run_dir());
    let mut controller = TrainingCycleController::new(
        config.clone(),
        model,
        KnnRecallEvaluator::from_config(&config),
        store.clone(),
    )
    .unwrap();

    let report = controller.train(&train, &val).unwrap();
    assert_eq!(report.epochs_trained, 2);
    assert!(report.epoch_losses.iter().flatten().all(|l| l.is_finite()));

    let recalls = report.last_recalls.expect("validation ran");
    assert_eq!(recalls.values().len(), config.recall_values.len());
    assert!(recalls.percentages().windows(2).all(|w| w[0] <= w[1]));

    let run = fixture.run_dir();
    for stem in ["model_01", "model_02"] {
        let state = run.join(stem).with_extension("json");
        assert!(state.is_file(), "{stem}.json");
        assert!(weights_path(&state).is_file(), "{stem}.safetensors");
    }
    // The first epoch always improves on the initial best of zero unless recall is zero.
    if report.best_r5 > 0.0 {
        assert!(store.best_path().is_file());
        assert_eq!(
            store.best_path().file_stem().and_then(|s| s.to_str()),
            Some(BEST_CHECKPOINT_STEM)
        );
    }

    let test_recalls = controller.test(&test).unwrap();
    assert_eq!(test_recalls.values().len(), 2);
}

#[test]
fn test_resume_from_disk_continues_epochs() {
    let fixture = DatasetFixture::new();
    let config = TrainConfig {
        epochs_num: 1,
        optim: OptimizerKind::Adam,
        ..fixture.config()
    };
    let (train, val) = (open(&config, "train"), open(&config, "val"));

    let store = FsCheckpointStore::new(fixture.run_dir());
    let model = GeoLocalizationNet::new(&config, 3, &Device::Cpu).unwrap();
    let mut first = TrainingCycleController::new(
        config.clone(),
        model,
        ScriptedEvaluator::from_r5(&[40.0]),
        store.clone(),
    )
    .unwrap();
    first.train(&train, &val).unwrap();

    let resume = fixture.run_dir().join("model_01.json");
    let tensors = candle_core::safetensors::load(weights_path(&resume), &Device::Cpu).unwrap();
    assert!(tensors.contains_key("optim.t"));
    assert!(tensors.keys().any(|name| name.starts_with("optim.m.")));
    let continued = TrainConfig {
        epochs_num: 3,
        resume: Some(resume.clone()),
        ..config.clone()
    };
    continued.validate_paths().unwrap();

    let model = GeoLocalizationNet::new(&continued, 3, &Device::Cpu).unwrap();
    let mut second = TrainingCycleController::new(
        continued,
        model,
        ScriptedEvaluator::from_r5(&[30.0, 50.0]),
        store,
    )
    .unwrap();
    second.restore(&resume).unwrap();
    assert_eq!(second.state().best_r5, 40.0);

    let report = second.train(&train, &val).unwrap();
    assert_eq!(report.epochs_trained, 2);
    assert_eq!(report.last_epoch, 3);
    assert_eq!(report.best_r5, 50.0);
    assert!(fixture.run_dir().join("model_03.json").is_file());
}

#[test]
fn test_sare_with_sos_trains_in_memory() {
    let config = TrainConfig {
        loss: LossKind::SareInd,
        sos: true,
        sos_lambda: 0.5,
        epochs_num: 2,
        ..TrainConfig::for_testing()
    };
    let train = InMemoryDataset::line("toy/train", 6, 100.0).unwrap();
    let val = InMemoryDataset::line("toy/val", 3, 100.0).unwrap();

    let model = GeoLocalizationNet::new(&config, 3, &Device::Cpu).unwrap();
    let store = MemoryCheckpointStore::new();
    let mut controller = TrainingCycleController::new(
        config,
        model,
        ScriptedEvaluator::from_r5(&[10.0, 5.0]),
        &store,
    )
    .unwrap();

    let report = controller.train(&train, &val).unwrap();
    assert_eq!(report.epoch_losses.len(), 2);
    assert!(
        report
            .epoch_losses
            .iter()
            .all(|l| l.is_some_and(|l| l.is_finite() && l > 0.0))
    );
    assert_eq!(store.epochs(), vec![1, 2]);
    assert_eq!(store.best().map(|c| c.epoch_num), Some(1));
}
