//! On-disk dataset fixtures shared by integration tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::Tensor;
use geovpr::dataset::mock::render_location;
use geovpr::dataset::{IMAGES_FILENAME, InMemoryDataset, Location, MANIFEST_FILENAME};
use geovpr::TrainConfig;
use serde_json::json;
use tempfile::TempDir;

pub const DATASET_NAME: &str = "toyset";

/// Database images every `spacing` meters on a line, queries a few meters off.
pub fn line_locations(places: usize, spacing: f64, offset: f64) -> (Vec<Location>, Vec<Location>) {
    let database: Vec<Location> = (0..places)
        .map(|i| Location::new(offset + i as f64 * spacing, 0.0))
        .collect();
    let queries = database
        .iter()
        .map(|l| Location::new(l.easting + 2.0, l.northing + 1.0))
        .collect();
    (database, queries)
}

/// Writes `<root>/<split>/manifest.json` and `images.safetensors`.
pub fn write_split(root: &Path, split: &str, database: &[Location], queries: &[Location]) {
    let dir = root.join(split);
    std::fs::create_dir_all(&dir).expect("create split dir");

    let mut tensors: HashMap<String, Tensor> = HashMap::new();
    let mut entries = |prefix: &str, locations: &[Location]| {
        locations
            .iter()
            .enumerate()
            .map(|(i, loc)| {
                let id = format!("{prefix}_{i:04}");
                let image = render_location(loc, InMemoryDataset::IMAGE_SHAPE).expect("render");
                tensors.insert(id.clone(), image);
                json!({ "id": id, "easting": loc.easting, "northing": loc.northing })
            })
            .collect::<Vec<_>>()
    };
    let database = entries("db", database);
    let queries = entries("q", queries);

    let manifest = json!({ "database": database, "queries": queries });
    std::fs::write(dir.join(MANIFEST_FILENAME), manifest.to_string()).expect("write manifest");
    candle_core::safetensors::save(&tensors, dir.join(IMAGES_FILENAME)).expect("write images");
}

/// A datasets folder holding train, val and test splits of [`DATASET_NAME`].
pub struct DatasetFixture {
    pub dir: TempDir,
}

impl DatasetFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join(DATASET_NAME).join("images");
        for (split, places, offset) in [("train", 8, 0.0), ("val", 4, 5_000.0), ("test", 4, 9_000.0)] {
            let (database, queries) = line_locations(places, 120.0, offset);
            write_split(&root, split, &database, &queries);
        }
        Self { dir }
    }

    pub fn datasets_folder(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn run_dir(&self) -> PathBuf {
        self.dir.path().join("run")
    }

    /// Small config pointing at this fixture.
    pub fn config(&self) -> TrainConfig {
        TrainConfig {
            datasets_folder: self.datasets_folder(),
            dataset_name: DATASET_NAME.to_string(),
            ..TrainConfig::for_testing()
        }
    }
}
