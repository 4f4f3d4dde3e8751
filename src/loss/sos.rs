use candle_core::Tensor;

use super::{Gathered, squared_distance};

/// Keeps the gradient of `sqrt` finite when a slot has zero disagreement.
const SOS_EPS: f64 = 1e-12;

/// Second-order similarity: per negative slot
/// `sqrt(Σ_b (‖q_b − n_b‖² − ‖p_b − n_b‖²)²)`, summed over slots.
pub(crate) fn second_order_similarity(g: &Gathered) -> candle_core::Result<Tensor> {
    let d_qn = squared_distance(&g.queries, &g.negatives)?;
    let d_pn = squared_distance(&g.positives, &g.negatives)?;
    (d_qn - d_pn)?
        .sqr()?
        .reshape((g.batch_size, g.negs_num_per_query))?
        .sum(0)?
        .affine(1.0, SOS_EPS)?
        .sqrt()?
        .sum_all()
}
