//! Model provider backed by candle and Hugging Face downloads.

use std::path::PathBuf;
use std::sync::Arc;

use semantic_embeddings::{Device, SentenceEmbedder};
use tokio::runtime::Handle;

use crate::error::LoadError;

use super::download::{directory_for, download_model, repository_for};
use super::provider::{DeviceKind, EmbeddingModel, ModelProvider};

impl EmbeddingModel for SentenceEmbedder {
    fn encode(&self, texts: &[String], normalize: bool) -> anyhow::Result<Vec<Vec<f32>>> {
        self.encode_batch(texts, normalize)
    }

    fn dimensions(&self) -> usize {
        SentenceEmbedder::dimensions(self)
    }

    fn max_sequence_length(&self) -> usize {
        SentenceEmbedder::max_sequence_length(self)
    }
}

/// Loads sentence-transformer models from `models_dir`, downloading them first if needed.
///
/// `load` blocks on the download using the runtime handle captured at
/// construction, so it must run on a blocking thread (`spawn_blocking`),
/// never directly on an async worker.
pub struct CandleProvider {
    models_dir: PathBuf,
    runtime: Handle,
}

impl CandleProvider {
    pub fn new(models_dir: impl Into<PathBuf>, runtime: Handle) -> Self {
        Self {
            models_dir: models_dir.into(),
            runtime,
        }
    }

    fn candle_device(device: DeviceKind) -> Result<Device, LoadError> {
        match device {
            DeviceKind::Cpu => Ok(Device::Cpu),
            DeviceKind::Cuda => {
                Device::new_cuda(0).map_err(|e| LoadError::Runtime(format!("CUDA device 0: {}", e)))
            }
        }
    }
}

impl ModelProvider for CandleProvider {
    fn load(&self, name: &str, device: DeviceKind) -> Result<Arc<dyn EmbeddingModel>, LoadError> {
        let repo = repository_for(name);
        let model_dir = self.models_dir.join(directory_for(name));

        self.runtime
            .block_on(download_model(&repo, &model_dir))
            .map_err(|e| LoadError::failed(name, format!("{:#}", e)))?;

        let device = Self::candle_device(device)?;
        let embedder = SentenceEmbedder::load_from_dir(&model_dir, &device)
            .map_err(|e| LoadError::failed(name, format!("{:#}", e)))?;

        Ok(Arc::new(embedder))
    }

    fn gpu_available(&self) -> bool {
        semantic_embeddings::cuda_is_available()
    }
}
