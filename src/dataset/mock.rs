//! In-memory split for tests and examples.

use candle_core::{Device, Tensor};

use super::error::{DatasetError, DatasetResult};
use super::types::Location;
use super::GeoDataset;

/// Split held entirely in memory. Images are rendered from locations so that
/// nearby places produce similar pixels.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    name: String,
    database_len: usize,
    locations: Vec<Location>,
    images: Vec<Tensor>,
}

impl InMemoryDataset {
    /// Default rendered image shape `[C, H, W]`.
    pub const IMAGE_SHAPE: (usize, usize, usize) = (3, 8, 8);

    /// Builds a split with explicit images.
    pub fn new(
        name: &str,
        database: Vec<(Location, Tensor)>,
        queries: Vec<(Location, Tensor)>,
    ) -> Self {
        let database_len = database.len();
        let (locations, images) = database.into_iter().chain(queries).unzip();
        Self {
            name: name.to_string(),
            database_len,
            locations,
            images,
        }
    }

    /// Builds a split whose images are rendered from their locations.
    pub fn from_locations(
        name: &str,
        database: &[Location],
        queries: &[Location],
    ) -> DatasetResult<Self> {
        let render_all = |locs: &[Location]| -> DatasetResult<Vec<(Location, Tensor)>> {
            locs.iter()
                .map(|loc| Ok((*loc, render_location(loc, Self::IMAGE_SHAPE)?)))
                .collect()
        };
        Ok(Self::new(name, render_all(database)?, render_all(queries)?))
    }

    /// Database images on a line every `spacing` meters, each with one query a
    /// few meters away.
    pub fn line(name: &str, places: usize, spacing: f64) -> DatasetResult<Self> {
        let database: Vec<Location> = (0..places)
            .map(|i| Location::new(i as f64 * spacing, 0.0))
            .collect();
        let queries: Vec<Location> = database
            .iter()
            .map(|loc| Location::new(loc.easting + 2.0, loc.northing + 1.0))
            .collect();
        Self::from_locations(name, &database, &queries)
    }
}

/// Deterministic `[C, H, W]` pattern that varies smoothly with location.
pub fn render_location(
    location: &Location,
    (channels, height, width): (usize, usize, usize),
) -> DatasetResult<Tensor> {
    let mut data = Vec::with_capacity(channels * height * width);
    for c in 0..channels {
        let freq = 0.02 * (c + 1) as f64;
        for h in 0..height {
            for w in 0..width {
                let v = (location.easting * freq + h as f64 * 0.7).sin()
                    * (location.northing * freq + w as f64 * 0.7).cos();
                data.push(v as f32);
            }
        }
    }
    Ok(Tensor::from_vec(
        data,
        (channels, height, width),
        &Device::Cpu,
    )?)
}

impl GeoDataset for InMemoryDataset {
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
        self.locations
            .get(index)
            .copied()
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.locations.len(),
            })
    }

    fn image(&self, index: usize) -> DatasetResult<Tensor> {
        self.images
            .get(index)
            .cloned()
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.images.len(),
            })
    }
}
