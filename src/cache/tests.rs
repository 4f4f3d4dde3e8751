use super::*;
use crate::config::TrainConfig;
use crate::dataset::{GeoDataset, InMemoryDataset};
use crate::model::{FeatureExtractor, GeoLocalizationNet, Mode, ModelError};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;

fn fixture() -> (GeoLocalizationNet, InMemoryDataset) {
    let config = TrainConfig::for_testing();
    let model = GeoLocalizationNet::new(&config, 3, &Device::Cpu).expect("net");
    let dataset = InMemoryDataset::line("toy/train", 6, 100.0).expect("dataset");
    (model, dataset)
}

/// Extractor that returns one column too few.
struct TruncatingExtractor {
    var_map: VarMap,
    device: Device,
}

impl FeatureExtractor for TruncatingExtractor {
    fn embed(&self, images: &Tensor, _mode: Mode) -> Result<Tensor, ModelError> {
        let n = images.dim(0)?;
        Ok(Tensor::zeros((n, 3), DType::F32, &self.device)?)
    }

    fn features_dim(&self) -> usize {
        4
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn var_map(&self) -> &VarMap {
        &self.var_map
    }
}

#[test]
fn test_new_cache_is_empty() {
    let cache = EmbeddingCache::new(8, 4);
    assert_eq!(cache.version(), 0);
    assert!(cache.current().is_empty());
    assert_eq!(cache.current().dim(), 8);
}

#[test]
fn test_refresh_covers_pool() {
    let (model, dataset) = fixture();
    let mut cache = EmbeddingCache::new(model.features_dim(), 4);

    let pool = vec![0, 3, 5, 7, 11];
    let snapshot = cache.refresh(&model, &dataset, &pool).expect("refresh");

    assert_eq!(snapshot.version(), 1);
    assert_eq!(snapshot.len(), pool.len());
    for &i in &pool {
        assert_eq!(snapshot.get(i).map(<[f32]>::len), Some(model.features_dim()));
    }
    assert!(snapshot.get(1).is_none());
    assert_eq!(
        snapshot.memory_bytes(),
        pool.len() * model.features_dim() * 4
    );
}

#[test]
fn test_refresh_deduplicates_pool() {
    let (model, dataset) = fixture();
    let mut cache = EmbeddingCache::new(model.features_dim(), 2);
    let snapshot = cache
        .refresh(&model, &dataset, &[1, 2, 1, 2, 2])
        .expect("refresh");
    assert_eq!(snapshot.len(), 2);
}

#[test]
fn test_refresh_matches_direct_embedding() {
    let (model, dataset) = fixture();
    let mut cache = EmbeddingCache::new(model.features_dim(), 3);
    let snapshot = cache.refresh(&model, &dataset, &[4, 9]).expect("refresh");

    let image = dataset.image(9).unwrap().unsqueeze(0).unwrap();
    let direct: Vec<f32> = model
        .embed(&image, Mode::Inference)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1()
        .unwrap();
    let cached = snapshot.get(9).unwrap();
    for (a, b) in direct.iter().zip(cached) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_old_snapshot_survives_refresh() {
    let (model, dataset) = fixture();
    let mut cache = EmbeddingCache::new(model.features_dim(), 4);

    let first = cache.refresh(&model, &dataset, &[0, 1]).expect("refresh");
    let second = cache.refresh(&model, &dataset, &[2, 3]).expect("refresh");

    assert_eq!(first.version(), 1);
    assert_eq!(second.version(), 2);
    assert!(first.contains(0) && !first.contains(2));
    assert!(second.contains(2) && !second.contains(0));
    assert_eq!(cache.current().version(), 2);
}

#[test]
fn test_failed_refresh_keeps_previous_snapshot() {
    let (model, dataset) = fixture();
    let mut cache = EmbeddingCache::new(model.features_dim(), 4);
    cache.refresh(&model, &dataset, &[0, 1]).expect("refresh");

    let err = cache.refresh(&model, &dataset, &[2, 999]).unwrap_err();
    assert!(matches!(err, CacheError::Dataset(_)));
    assert_eq!(cache.version(), 1);
    assert!(cache.current().contains(0));
}

#[test]
fn test_refresh_rejects_wrong_feature_shape() {
    let (_, dataset) = fixture();
    let extractor = TruncatingExtractor {
        var_map: VarMap::new(),
        device: Device::Cpu,
    };
    let mut cache = EmbeddingCache::new(4, 4);
    let err = cache.refresh(&extractor, &dataset, &[0, 1]).unwrap_err();
    assert!(matches!(err, CacheError::ShapeMismatch { rows: 2, dim: 4, .. }));
}

#[test]
fn test_squared_distance() {
    let snapshot = CacheSnapshot::new(1, 2, vec![10, 20], vec![0.0, 0.0, 3.0, 4.0]);
    assert_eq!(snapshot.squared_distance(10, 20), Some(25.0));
    assert_eq!(snapshot.squared_distance(10, 30), None);
    assert_eq!(squared_l2(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
}
