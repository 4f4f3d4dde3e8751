use serde::{Deserialize, Serialize};

/// Planar UTM position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub easting: f64,
    pub northing: f64,
}

impl Location {
    pub fn new(easting: f64, northing: f64) -> Self {
        Self { easting, northing }
    }

    /// Euclidean distance in meters.
    #[inline]
    pub fn distance(&self, other: &Location) -> f64 {
        (self.easting - other.easting).hypot(self.northing - other.northing)
    }
}

/// A training or evaluation query. `index` is the flat split index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Query {
    pub index: usize,
    pub location: Location,
}
