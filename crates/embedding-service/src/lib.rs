//! embedding-service: HTTP API that turns text into sentence embeddings.
//!
//! Models are loaded on first use through a [`models::ModelProvider`] and kept
//! in a bounded [`ModelManager`]. [`EmbeddingService`] maps requested model
//! names, falls back to the default model when a load fails, truncates input
//! and batches inference.

pub mod config;
pub mod error;
pub mod models;
pub mod names;
pub mod routes;
pub mod service;

// Re-export key types for convenience
pub use config::Settings;
pub use error::{EmbeddingError, LoadError};
pub use models::{CandleProvider, DeviceKind, ModelManager, ModelMetadata};
pub use names::NameMapper;
pub use routes::{router, AppState};
pub use service::{EmbeddingConfig, EmbeddingService};
