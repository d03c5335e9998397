//! Query encoding and quantized corpus vectors
//!
//! - `EmbeddingProvider` trait abstracts the query encoder (FastEmbed locally,
//!   or anything else that honours the shape and normalization contract)
//! - `QuantizedStore` holds one byte per component for every corpus item and
//!   owns the dequantization rule shared with the asset builder
mod provider;
mod store;

pub use provider::{normalize_l2, EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use store::{dequantize, quantize, quantize_vector, QuantizedStore};

/// Embedding width of the corpus model (MPNet base)
pub const DEFAULT_DIMENSION: usize = 768;
