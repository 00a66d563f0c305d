#![deny(clippy::all)]

//! Sentence embeddings from BERT and MPNet models (all-MiniLM, all-mpnet, ...) on candle.
//!
//! # Example
//! ```ignore
//! use candle_core::Device;
//! use semantic_embeddings::SentenceEmbedder;
//! use std::path::Path;
//!
//! let embedder = SentenceEmbedder::load_from_dir(Path::new("models/all-MiniLM-L6-v2"), &Device::Cpu)?;
//! let embedding = embedder.encode("Hello world", true)?;
//! assert_eq!(embedding.len(), embedder.dimensions());
//! ```

mod model;
mod mpnet;

pub use model::SentenceEmbedder;

/// Device handle re-exported so callers don't need a direct candle dependency.
pub use candle_core::Device;

/// Whether candle was built with CUDA support and a CUDA device is present.
pub fn cuda_is_available() -> bool {
    candle_core::utils::cuda_is_available()
}
