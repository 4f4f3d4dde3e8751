//! Stochastic attraction-repulsion embedding losses.

use candle_core::{D, Tensor};
use candle_nn::ops::log_softmax;

use super::{Gathered, squared_distance};

/// `Σ −log softmax([−‖q − p‖², −‖q − n‖²])₀`, one term per (triplet, negative) row.
pub(crate) fn sare_ind(g: &Gathered) -> candle_core::Result<Tensor> {
    let d_pos = squared_distance(&g.queries, &g.positives)?.neg()?;
    let d_neg = squared_distance(&g.queries, &g.negatives)?.neg()?;
    let logits = Tensor::stack(&[&d_pos, &d_neg], 1)?;
    attraction_term(&logits)
}

/// `Σ −log softmax([−‖q − p‖², −‖q − n₁‖², …, −‖q − n_N‖²])₀`, one term per triplet.
pub(crate) fn sare_joint(g: &Gathered) -> candle_core::Result<Tensor> {
    let shape = (g.batch_size, g.negs_num_per_query);
    // Rows are triplet-major, so every row of a triplet carries the same positive.
    let d_pos = squared_distance(&g.queries, &g.positives)?
        .reshape(shape)?
        .narrow(1, 0, 1)?
        .neg()?;
    let d_neg = squared_distance(&g.queries, &g.negatives)?
        .reshape(shape)?
        .neg()?;
    let logits = Tensor::cat(&[&d_pos, &d_neg], 1)?;
    attraction_term(&logits)
}

fn attraction_term(logits: &Tensor) -> candle_core::Result<Tensor> {
    log_softmax(logits, D::Minus1)?
        .narrow(1, 0, 1)?
        .neg()?
        .sum_all()
}
