//! Geo-tagged image splits.
//!
//! A split exposes one flat index space: database images first
//! (`0..database_len`), then queries (`database_len..len`).
//!
//! - [`SafetensorsSplit`] loads a split from `manifest.json` + `images.safetensors`.
//! - [`GeoIndex`] answers the radius queries used for positives and true negatives.

pub mod error;
pub mod geo;
pub mod split;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use error::{DatasetError, DatasetResult};
pub use geo::GeoIndex;
#[cfg(any(test, feature = "mock"))]
pub use mock::InMemoryDataset;
pub use split::{IMAGES_FILENAME, MANIFEST_FILENAME, SafetensorsSplit};
pub use types::{Location, Query};

use candle_core::Tensor;

/// Provider of geo-tagged images for one split.
///
/// Implementations are shared with the batch prefetch thread, hence `Sync`.
pub trait GeoDataset: Send + Sync {
    /// Human readable split name (e.g. `pitts30k/train`).
    fn name(&self) -> &str;

    fn database_len(&self) -> usize;

    fn queries_len(&self) -> usize;

    /// Location of the image at a flat index.
    fn location(&self, index: usize) -> DatasetResult<Location>;

    /// Image tensor `[C, H, W]` (f32) at a flat index.
    fn image(&self, index: usize) -> DatasetResult<Tensor>;

    fn len(&self) -> usize {
        self.database_len() + self.queries_len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index of the `query`-th query.
    fn query_index(&self, query: usize) -> usize {
        self.database_len() + query
    }

    /// The `query`-th query with its location.
    fn query(&self, query: usize) -> DatasetResult<Query> {
        let index = self.query_index(query);
        Ok(Query {
            index,
            location: self.location(index)?,
        })
    }

    /// Radius index over all database images.
    fn geo_index(&self) -> DatasetResult<GeoIndex> {
        let locations = (0..self.database_len())
            .map(|i| self.location(i))
            .collect::<DatasetResult<Vec<_>>>()?;
        Ok(GeoIndex::new(locations))
    }

    /// One-line summary used in logs.
    fn describe(&self) -> String {
        format!(
            "< {} - #database: {}; #queries: {} >",
            self.name(),
            self.database_len(),
            self.queries_len()
        )
    }
}
