//! Split stored as a JSON manifest plus one safetensors file.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor};
use serde::Deserialize;
use tracing::{debug, info};

use super::error::{DatasetError, DatasetResult};
use super::types::Location;
use super::GeoDataset;

pub const MANIFEST_FILENAME: &str = "manifest.json";
pub const IMAGES_FILENAME: &str = "images.safetensors";

#[derive(Debug, Deserialize)]
struct Manifest {
    database: Vec<ManifestEntry>,
    queries: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    easting: f64,
    northing: f64,
}

/// Split loaded from `<root>/<split>/manifest.json` and `<root>/<split>/images.safetensors`.
///
/// Images are kept on the CPU; consumers move batches to the model device.
pub struct SafetensorsSplit {
    name: String,
    database_len: usize,
    locations: Vec<Location>,
    images: Vec<Tensor>,
}

impl std::fmt::Debug for SafetensorsSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetensorsSplit")
            .field("name", &self.name)
            .field("database_len", &self.database_len)
            .field("queries_len", &self.queries_len())
            .finish()
    }
}

impl SafetensorsSplit {
    /// Opens `split` (e.g. `"train"`, `"val"`, `"test"`) under `root`.
    pub fn open<P: AsRef<Path>>(root: P, dataset_name: &str, split: &str) -> DatasetResult<Self> {
        let dir = root.as_ref().join(split);
        let manifest_path = dir.join(MANIFEST_FILENAME);
        let images_path = dir.join(IMAGES_FILENAME);

        if !manifest_path.is_file() {
            return Err(DatasetError::ManifestNotFound {
                path: manifest_path,
            });
        }

        let raw = std::fs::read_to_string(&manifest_path)?;
        let manifest: Manifest =
            serde_json::from_str(&raw).map_err(|source| DatasetError::ManifestParse {
                path: manifest_path.clone(),
                source,
            })?;

        let mut tensors = candle_core::safetensors::load(&images_path, &Device::Cpu)?;
        debug!(
            path = %images_path.display(),
            tensors = tensors.len(),
            "Loaded image tensors"
        );

        let database_len = manifest.database.len();
        let entries = manifest.database.into_iter().chain(manifest.queries);

        let mut locations = Vec::new();
        let mut images = Vec::new();
        let mut expected_shape: Option<Vec<usize>> = None;

        for entry in entries {
            let image = Self::take_image(&mut tensors, &entry.id, &images_path)?;
            let shape = image.dims().to_vec();
            match &expected_shape {
                None => expected_shape = Some(shape),
                Some(expected) if *expected != shape => {
                    return Err(DatasetError::ShapeMismatch {
                        id: entry.id,
                        expected: expected.clone(),
                        actual: shape,
                    });
                }
                Some(_) => {}
            }
            locations.push(Location::new(entry.easting, entry.northing));
            images.push(image);
        }

        let split = Self {
            name: format!("{dataset_name}/{split}"),
            database_len,
            locations,
            images,
        };
        info!(split = %split.describe(), "Dataset split loaded");
        Ok(split)
    }

    fn take_image(
        tensors: &mut HashMap<String, Tensor>,
        id: &str,
        path: &Path,
    ) -> DatasetResult<Tensor> {
        let image = tensors
            .remove(id)
            .ok_or_else(|| DatasetError::ImageMissing {
                id: id.to_string(),
                path: path.to_path_buf(),
            })?;
        let image = image.to_dtype(candle_core::DType::F32)?;
        if image.rank() != 3 {
            return Err(DatasetError::ImageLoadFailed {
                reason: format!("image '{id}' must be [C, H, W], got {:?}", image.dims()),
            });
        }
        Ok(image)
    }

    fn check(&self, index: usize) -> DatasetResult<()> {
        if index >= self.locations.len() {
            return Err(DatasetError::IndexOutOfRange {
                index,
                len: self.locations.len(),
            });
        }
        Ok(())
    }
}

impl GeoDataset for SafetensorsSplit {
    fn name(&self) -> &str {
        &self.name
    }

    fn database_len(&self) -> usize {
        self.database_len
    }

    fn queries_len(&self) -> usize {
        self.locations.len() - self.database_len
    }

    fn location(&self, index: usize) -> DatasetResult<Location> {
        self.check(index)?;
        Ok(self.locations[index])
    }

    fn image(&self, index: usize) -> DatasetResult<Tensor> {
        self.check(index)?;
        Ok(self.images[index].clone())
    }
}
