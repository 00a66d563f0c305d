//! Model loading and caching.
//!
//! This module handles:
//! - The provider/model capability traits
//! - Model downloading from Hugging Face
//! - The bounded cache of loaded models

mod candle;
mod download;
mod manager;
mod provider;

pub use candle::CandleProvider;
pub use manager::{LoadedModel, ModelManager};
pub use provider::{DeviceKind, EmbeddingModel, ModelMetadata, ModelProvider};

#[cfg(test)]
pub(crate) use manager::testing;
