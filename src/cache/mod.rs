//! Embedding cache used for hard-negative mining.
//!
//! Each refresh produces a new immutable, versioned [`CacheSnapshot`]; the
//! [`EmbeddingCache`] only swaps which snapshot is current.

pub mod embedding;
pub mod error;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use embedding::EmbeddingCache;
pub use error::{CacheError, CacheResult};
pub use snapshot::{CacheSnapshot, squared_l2};
