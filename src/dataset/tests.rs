use super::*;
use candle_core::{Device, Tensor};
use std::collections::HashMap;
use tempfile::TempDir;

fn image(value: f32) -> Tensor {
    Tensor::full(value, (3, 4, 4), &Device::Cpu).expect("tensor")
}

fn write_split(dir: &std::path::Path, manifest: &str, tensors: HashMap<String, Tensor>) {
    std::fs::create_dir_all(dir).expect("mkdir");
    std::fs::write(dir.join(MANIFEST_FILENAME), manifest).expect("write manifest");
    candle_core::safetensors::save(&tensors, dir.join(IMAGES_FILENAME)).expect("write images");
}

#[test]
fn test_location_distance() {
    let a = Location::new(0.0, 0.0);
    let b = Location::new(3.0, 4.0);
    assert!((a.distance(&b) - 5.0).abs() < 1e-12);
    assert_eq!(a.distance(&a), 0.0);
}

#[test]
fn test_geo_index_within_sorted_by_distance() {
    let index = GeoIndex::new(vec![
        Location::new(20.0, 0.0),
        Location::new(5.0, 0.0),
        Location::new(100.0, 0.0),
        Location::new(0.0, 1.0),
    ]);

    let hits = index.within(&Location::new(0.0, 0.0), 25.0);
    assert_eq!(hits, vec![3, 1, 0]);
}

#[test]
fn test_geo_index_radius_is_inclusive() {
    let index = GeoIndex::new(vec![Location::new(10.0, 0.0)]);
    assert_eq!(index.within(&Location::default(), 10.0), vec![0]);
    assert!(index.within(&Location::default(), 9.5).is_empty());
}

#[test]
fn test_in_memory_flat_indexing() {
    let ds = InMemoryDataset::line("toy/train", 5, 100.0).expect("dataset");

    assert_eq!(ds.database_len(), 5);
    assert_eq!(ds.queries_len(), 5);
    assert_eq!(ds.len(), 10);
    assert_eq!(ds.query_index(2), 7);

    let q = ds.query(2).expect("query");
    assert_eq!(q.index, 7);
    assert_eq!(q.location, Location::new(202.0, 1.0));

    let img = ds.image(0).expect("image");
    assert_eq!(img.dims(), &[3, 8, 8]);

    assert!(matches!(
        ds.image(10),
        Err(DatasetError::IndexOutOfRange { index: 10, len: 10 })
    ));
}

#[test]
fn test_in_memory_geo_index_covers_database_only() {
    let ds = InMemoryDataset::line("toy/train", 4, 50.0).expect("dataset");
    let index = ds.geo_index().expect("geo index");
    assert_eq!(index.len(), 4);

    let q = ds.query(1).expect("query");
    assert_eq!(index.within(&q.location, 10.0), vec![1]);
}

#[test]
fn test_render_location_is_deterministic_and_local() {
    let shape = InMemoryDataset::IMAGE_SHAPE;
    let a = mock::render_location(&Location::new(10.0, 10.0), shape).unwrap();
    let b = mock::render_location(&Location::new(10.0, 10.0), shape).unwrap();
    let near = mock::render_location(&Location::new(12.0, 11.0), shape).unwrap();
    let far = mock::render_location(&Location::new(400.0, 250.0), shape).unwrap();

    let diff = |x: &Tensor, y: &Tensor| -> f32 {
        (x - y)
            .unwrap()
            .sqr()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap()
    };
    assert_eq!(diff(&a, &b), 0.0);
    assert!(diff(&a, &near) < diff(&a, &far));
}

#[test]
fn test_describe_format() {
    let ds = InMemoryDataset::line("toy/val", 3, 100.0).expect("dataset");
    assert_eq!(ds.describe(), "< toy/val - #database: 3; #queries: 3 >");
}

#[test]
fn test_safetensors_split_open() {
    let tmp = TempDir::new().expect("tempdir");
    let manifest = r#"{
        "database": [
            {"id": "db0", "easting": 0.0, "northing": 0.0},
            {"id": "db1", "easting": 100.0, "northing": 0.0}
        ],
        "queries": [
            {"id": "q0", "easting": 3.0, "northing": 4.0}
        ]
    }"#;
    let tensors = HashMap::from([
        ("db0".to_string(), image(0.0)),
        ("db1".to_string(), image(1.0)),
        ("q0".to_string(), image(2.0)),
    ]);
    write_split(&tmp.path().join("train"), manifest, tensors);

    let split = SafetensorsSplit::open(tmp.path(), "toy", "train").expect("open split");
    assert_eq!(split.name(), "toy/train");
    assert_eq!(split.database_len(), 2);
    assert_eq!(split.queries_len(), 1);
    assert_eq!(split.location(2).unwrap(), Location::new(3.0, 4.0));

    let q = split.image(2).expect("image");
    let mean = q.mean_all().unwrap().to_scalar::<f32>().unwrap();
    assert!((mean - 2.0).abs() < 1e-6);
}

#[test]
fn test_safetensors_split_missing_manifest() {
    let tmp = TempDir::new().expect("tempdir");
    let err = SafetensorsSplit::open(tmp.path(), "toy", "val").unwrap_err();
    assert!(matches!(err, DatasetError::ManifestNotFound { .. }));
}

#[test]
fn test_safetensors_split_missing_image() {
    let tmp = TempDir::new().expect("tempdir");
    let manifest = r#"{
        "database": [{"id": "db0", "easting": 0.0, "northing": 0.0}],
        "queries": [{"id": "q0", "easting": 1.0, "northing": 0.0}]
    }"#;
    let tensors = HashMap::from([("db0".to_string(), image(0.0))]);
    write_split(&tmp.path().join("test"), manifest, tensors);

    let err = SafetensorsSplit::open(tmp.path(), "toy", "test").unwrap_err();
    assert!(matches!(err, DatasetError::ImageMissing { ref id, .. } if id == "q0"));
}

#[test]
fn test_safetensors_split_shape_mismatch() {
    let tmp = TempDir::new().expect("tempdir");
    let manifest = r#"{
        "database": [{"id": "db0", "easting": 0.0, "northing": 0.0}],
        "queries": [{"id": "q0", "easting": 1.0, "northing": 0.0}]
    }"#;
    let tensors = HashMap::from([
        ("db0".to_string(), image(0.0)),
        (
            "q0".to_string(),
            Tensor::zeros((3, 2, 2), candle_core::DType::F32, &Device::Cpu).unwrap(),
        ),
    ]);
    write_split(&tmp.path().join("val"), manifest, tensors);

    let err = SafetensorsSplit::open(tmp.path(), "toy", "val").unwrap_err();
    assert!(matches!(err, DatasetError::ShapeMismatch { .. }));
}

#[test]
fn test_safetensors_split_bad_manifest() {
    let tmp = TempDir::new().expect("tempdir");
    write_split(&tmp.path().join("train"), "{ not json", HashMap::new());
    let err = SafetensorsSplit::open(tmp.path(), "toy", "train").unwrap_err();
    assert!(matches!(err, DatasetError::ManifestParse { .. }));
}
