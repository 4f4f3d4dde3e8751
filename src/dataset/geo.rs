//! Radius queries over database locations.

use super::types::Location;

/// Brute-force radius index over database image locations.
///
/// Splits are small enough (tens of thousands of images) that a linear scan per
/// query, done once at construction time of miners and evaluators, is cheaper
/// than maintaining a spatial tree.
#[derive(Debug, Clone, Default)]
pub struct GeoIndex {
    locations: Vec<Location>,
}

impl GeoIndex {
    pub fn new(locations: Vec<Location>) -> Self {
        Self { locations }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Database indices within `radius` meters of `point`, nearest first.
    pub fn within(&self, point: &Location, radius: f64) -> Vec<usize> {
        let mut hits: Vec<(usize, f64)> = self
            .locations
            .iter()
            .enumerate()
            .filter_map(|(i, loc)| {
                let d = point.distance(loc);
                (d <= radius).then_some((i, d))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.into_iter().map(|(i, _)| i).collect()
    }
}
