use std::collections::HashMap;

/// Immutable embeddings of one mining pool, produced by a single refresh.
///
/// Rows are stored contiguously; `rows` maps a flat dataset index to its row.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    version: u64,
    dim: usize,
    rows: HashMap<usize, usize>,
    data: Vec<f32>,
}

impl CacheSnapshot {
    /// Empty snapshot used before the first refresh.
    pub fn empty(dim: usize) -> Self {
        Self {
            dim,
            ..Default::default()
        }
    }

    pub(crate) fn new(
        version: u64,
        dim: usize,
        indices: Vec<usize>,
        data: Vec<f32>,
    ) -> Self {
        debug_assert_eq!(indices.len() * dim, data.len());
        let rows = indices
            .into_iter()
            .enumerate()
            .map(|(row, index)| (index, row))
            .collect();
        Self {
            version,
            dim,
            rows,
            data,
        }
    }

    /// Refresh counter this snapshot was produced by (`0` = never refreshed).
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.rows.contains_key(&index)
    }

    /// Embedding of a flat dataset index, if the last refresh covered it.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&[f32]> {
        self.rows.get(&index).map(|&row| {
            let start = row * self.dim;
            &self.data[start..start + self.dim]
        })
    }

    /// Squared Euclidean distance between two cached embeddings.
    pub fn squared_distance(&self, a: usize, b: usize) -> Option<f32> {
        Some(squared_l2(self.get(a)?, self.get(b)?))
    }

    /// Bytes held by the embedding rows.
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Squared Euclidean distance. Slices must have equal length.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
