use candle_core::Tensor;

use super::{Gathered, pairwise_distance};

/// `Σ max(0, ‖q − p‖ − ‖q − n‖ + margin)` over every (triplet, negative) row.
pub(crate) fn triplet_margin(g: &Gathered, margin: f32) -> candle_core::Result<Tensor> {
    let d_pos = pairwise_distance(&g.queries, &g.positives)?;
    let d_neg = pairwise_distance(&g.queries, &g.negatives)?;
    (d_pos - d_neg)?
        .affine(1.0, margin as f64)?
        .relu()?
        .sum_all()
}
