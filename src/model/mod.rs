//! Feature extraction.
//!
//! - [`FeatureExtractor`] is the seam the training cycle depends on.
//! - [`GeoLocalizationNet`] is the bundled candle implementation.
//! - [`device`] picks CPU / Metal / CUDA.

/// Device selection (CPU / Metal / CUDA).
pub mod device;
mod error;
/// Convolutional backbone + aggregation.
pub mod network;


pub use device::select_device;
pub use error::ModelError;
pub use network::{GeoLocalizationNet, l2_normalize};

use candle_core::{Device, Tensor};
use candle_nn::VarMap;

/// Whether a forward pass records the autograd graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Graded forward pass used for back-propagation.
    Train,
    /// Detached forward pass for cache refresh and evaluation.
    Inference,
}

/// Maps an image batch `[N, C, H, W]` to embeddings `[N, features_dim]`.
///
/// Implementations must be deterministic for identical weights and mode.
pub trait FeatureExtractor {
    fn embed(&self, images: &Tensor, mode: Mode) -> Result<Tensor, ModelError>;

    fn features_dim(&self) -> usize;

    fn device(&self) -> &Device;

    /// Trainable parameters; also what checkpoints persist.
    fn var_map(&self) -> &VarMap;
}
