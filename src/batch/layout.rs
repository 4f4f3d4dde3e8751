use candle_core::{Device, Tensor};

/// Positions of query, positive and negative images inside a flattened batch.
///
/// A batch holds `batch_size` triplets of `2 + negs_num_per_query` images each,
/// laid out query, positive, negatives. `rows` has one `[query, positive, negative]`
/// entry per (triplet, negative slot), triplet-major, so row `t * N + s` pairs
/// triplet `t` with its `s`-th negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripletLayout {
    batch_size: usize,
    negs_num_per_query: usize,
    rows: Vec<[u32; 3]>,
}

impl TripletLayout {
    pub fn new(batch_size: usize, negs_num_per_query: usize) -> Self {
        let per_triplet = crate::constants::images_per_triplet(negs_num_per_query);
        let rows = (0..batch_size)
            .flat_map(|t| {
                let offset = (t * per_triplet) as u32;
                (0..negs_num_per_query)
                    .map(move |s| [offset, offset + 1, offset + 2 + s as u32])
            })
            .collect();
        Self {
            batch_size,
            negs_num_per_query,
            rows,
        }
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn negs_num_per_query(&self) -> usize {
        self.negs_num_per_query
    }

    /// Number of images in the batch.
    #[inline]
    pub fn images_len(&self) -> usize {
        crate::constants::images_per_batch(self.batch_size, self.negs_num_per_query)
    }

    pub fn rows(&self) -> &[[u32; 3]] {
        &self.rows
    }

    /// Rows of the `slot`-th negative across all triplets.
    pub fn slot(&self, slot: usize) -> Vec<[u32; 3]> {
        self.rows
            .iter()
            .skip(slot)
            .step_by(self.negs_num_per_query.max(1))
            .copied()
            .collect()
    }

    pub fn queries(&self) -> Vec<u32> {
        self.column(0)
    }

    pub fn positives(&self) -> Vec<u32> {
        self.column(1)
    }

    pub fn negatives(&self) -> Vec<u32> {
        self.column(2)
    }

    /// Query, positive and negative columns as `u32` index tensors for `index_select`.
    pub fn index_tensors(&self, device: &Device) -> candle_core::Result<[Tensor; 3]> {
        let n = self.rows.len();
        Ok([
            Tensor::from_vec(self.queries(), n, device)?,
            Tensor::from_vec(self.positives(), n, device)?,
            Tensor::from_vec(self.negatives(), n, device)?,
        ])
    }

    fn column(&self, col: usize) -> Vec<u32> {
        self.rows.iter().map(|row| row[col]).collect()
    }
}
