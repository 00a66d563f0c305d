//! The capability set the service needs from an embedding model and its loader.

use std::fmt;
use std::sync::Arc;

use clap::ValueEnum;
use serde::Serialize;

use crate::error::LoadError;

/// Where a model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    #[value(alias = "gpu")]
    Cuda,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => f.write_str("cpu"),
            DeviceKind::Cuda => f.write_str("cuda"),
        }
    }
}

/// A loaded, inference-capable model.
///
/// Implementations are shared behind `Arc`, so a caller that obtained a model
/// keeps it alive even if the cache drops it mid-inference.
pub trait EmbeddingModel: Send + Sync {
    /// Encode `texts` into one vector each, in input order.
    fn encode(&self, texts: &[String], normalize: bool) -> anyhow::Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    fn max_sequence_length(&self) -> usize;
}

/// Loads models by canonical name.
pub trait ModelProvider: Send + Sync {
    /// Load `name` onto `device`. Blocking; may download files and allocate weights.
    fn load(&self, name: &str, device: DeviceKind) -> Result<Arc<dyn EmbeddingModel>, LoadError>;

    fn gpu_available(&self) -> bool;
}

/// Facts about a loaded model, fixed once it finishes loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelMetadata {
    pub name: String,
    pub dimensions: usize,
    pub max_sequence_length: usize,
    pub device: DeviceKind,
}
