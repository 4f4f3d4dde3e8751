use std::fmt;

use serde::{Deserialize, Serialize};

/// `(K, recall@K in percent)` pairs in configured order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recalls {
    values: Vec<(usize, f32)>,
}

impl Recalls {
    pub fn new(values: Vec<(usize, f32)>) -> Self {
        Self { values }
    }

    /// Pairs `recall_values` with already computed percentages.
    pub fn from_percentages(recall_values: &[usize], percentages: &[f32]) -> Self {
        Self::new(
            recall_values
                .iter()
                .copied()
                .zip(percentages.iter().copied())
                .collect(),
        )
    }

    pub fn values(&self) -> &[(usize, f32)] {
        &self.values
    }

    /// Recall at the `position`-th configured K.
    pub fn at(&self, position: usize) -> Option<f32> {
        self.values.get(position).map(|&(_, r)| r)
    }

    /// Recall for a specific K.
    pub fn get(&self, k: usize) -> Option<f32> {
        self.values.iter().find(|(key, _)| *key == k).map(|&(_, r)| r)
    }

    pub fn percentages(&self) -> Vec<f32> {
        self.values.iter().map(|&(_, r)| r).collect()
    }
}

impl fmt::Display for Recalls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, r)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "R@{k}: {r:.1}")?;
        }
        Ok(())
    }
}
