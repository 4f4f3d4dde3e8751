//! Metric-learning losses over a [`TripletBatch`](crate::batch::TripletBatch).
//!
//! The policy is picked once from the configuration; every variant is a pure
//! function of the batch embeddings and its [`TripletLayout`].

mod sare;
mod sos;
mod triplet;


use candle_core::{D, Tensor};

use crate::batch::TripletLayout;

/// Added inside `‖a − b + eps‖` like a pairwise distance.
pub const PAIRWISE_EPS: f64 = 1e-6;

/// Which loss to train with and its parameters. `sos_lambda` enables the
/// second-order similarity term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LossPolicy {
    Triplet { margin: f32, sos_lambda: Option<f32> },
    SareJoint { sos_lambda: Option<f32> },
    SareInd { sos_lambda: Option<f32> },
}

impl LossPolicy {
    pub fn sos_lambda(&self) -> Option<f32> {
        match *self {
            LossPolicy::Triplet { sos_lambda, .. }
            | LossPolicy::SareJoint { sos_lambda }
            | LossPolicy::SareInd { sos_lambda } => sos_lambda,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LossPolicy::Triplet { .. } => "triplet",
            LossPolicy::SareJoint { .. } => "sare_joint",
            LossPolicy::SareInd { .. } => "sare_ind",
        }
    }
}

/// Query, positive and negative embeddings gathered per layout row (`[B * N, D]`).
pub(crate) struct Gathered {
    pub queries: Tensor,
    pub positives: Tensor,
    pub negatives: Tensor,
    pub batch_size: usize,
    pub negs_num_per_query: usize,
}

impl Gathered {
    fn new(embeddings: &Tensor, layout: &TripletLayout) -> candle_core::Result<Self> {
        let rows = embeddings.dim(0)?;
        if rows != layout.images_len() {
            candle_core::bail!(
                "loss expects {} embeddings for the batch layout, got {rows}",
                layout.images_len()
            );
        }
        let [q, p, n] = layout.index_tensors(embeddings.device())?;
        Ok(Self {
            queries: embeddings.index_select(&q, 0)?,
            positives: embeddings.index_select(&p, 0)?,
            negatives: embeddings.index_select(&n, 0)?,
            batch_size: layout.batch_size(),
            negs_num_per_query: layout.negs_num_per_query(),
        })
    }
}

/// Row-wise squared Euclidean distance, `[R, D] x [R, D] -> [R]`.
pub(crate) fn squared_distance(a: &Tensor, b: &Tensor) -> candle_core::Result<Tensor> {
    (a - b)?.sqr()?.sum(D::Minus1)
}

/// Row-wise `‖a − b + eps‖`.
pub(crate) fn pairwise_distance(a: &Tensor, b: &Tensor) -> candle_core::Result<Tensor> {
    (a - b)?
        .affine(1.0, PAIRWISE_EPS)?
        .sqr()?
        .sum(D::Minus1)?
        .sqrt()
}

/// Computes the normalized batch loss for a fixed policy.
#[derive(Debug, Clone)]
pub struct LossDispatcher {
    policy: LossPolicy,
}

impl LossDispatcher {
    pub fn new(policy: LossPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> LossPolicy {
        self.policy
    }

    /// Scalar loss for one batch, divided by `batch_size * negs_num_per_query`.
    pub fn compute(&self, embeddings: &Tensor, layout: &TripletLayout) -> candle_core::Result<Tensor> {
        let gathered = Gathered::new(embeddings, layout)?;

        let mut total = match self.policy {
            LossPolicy::Triplet { margin, .. } => triplet::triplet_margin(&gathered, margin)?,
            LossPolicy::SareJoint { .. } => sare::sare_joint(&gathered)?,
            LossPolicy::SareInd { .. } => sare::sare_ind(&gathered)?,
        };

        if let Some(lambda) = self.policy.sos_lambda() {
            total = (total + sos::second_order_similarity(&gathered)?.affine(lambda as f64, 0.0)?)?;
        }

        let rows = (gathered.batch_size * gathered.negs_num_per_query).max(1);
        total.affine(1.0 / rows as f64, 0.0)
    }
}
