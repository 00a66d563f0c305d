//! Embedding generation: model resolution, fallback, truncation and batching.

use std::sync::Arc;

use crate::error::{EmbeddingError, Result};
use crate::models::{LoadedModel, ModelManager, ModelMetadata};
use crate::names::NameMapper;

/// Settings the orchestrator needs.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Model used when none is requested and when a requested model fails to load
    pub default_model: String,
    /// Number of texts submitted to the model at once
    pub batch_size: usize,
    /// Texts are cut to this many characters before inference
    pub max_text_length: usize,
}

/// One embedding and the model that produced it.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
}

/// Embeddings for a batch, positionally aligned with the input texts.
#[derive(Debug, Clone)]
pub struct BatchEmbeddings {
    pub vectors: Vec<Vec<f32>>,
    pub model: String,
    pub dimensions: usize,
}

/// Turns text into vectors using models from a shared [`ModelManager`].
///
/// All methods block while models load or run; call them from `spawn_blocking`.
pub struct EmbeddingService {
    models: Arc<ModelManager>,
    names: NameMapper,
    batch_size: usize,
    max_text_length: usize,
}

impl EmbeddingService {
    pub fn new(models: Arc<ModelManager>, config: EmbeddingConfig) -> Self {
        Self {
            models,
            names: NameMapper::new(config.default_model),
            batch_size: config.batch_size.max(1),
            max_text_length: config.max_text_length.max(1),
        }
    }

    pub fn default_model(&self) -> &str {
        self.names.default_model()
    }

    pub fn models(&self) -> &Arc<ModelManager> {
        &self.models
    }

    /// Generate an embedding for a single text.
    pub fn embed_one(
        &self,
        text: &str,
        requested_model: Option<&str>,
        normalize: bool,
    ) -> Result<Embedding> {
        if text.is_empty() {
            return Err(EmbeddingError::Validation("Text cannot be empty".to_string()));
        }

        let loaded = self.acquire(requested_model)?;
        let model = loaded.metadata.name.clone();
        let text = self.truncate(text);

        let inference_error = |reason: String| EmbeddingError::Inference {
            model: model.clone(),
            count: 1,
            reason,
        };

        let vector = loaded
            .model
            .encode(&[text.to_string()], normalize)
            .map_err(|e| inference_error(format!("{:#}", e)))?
            .pop()
            .ok_or_else(|| inference_error("model returned no embedding".to_string()))?;

        let dimensions = vector.len();
        tracing::debug!(
            "Generated embedding with {}, dimensions: {}",
            model,
            dimensions
        );

        Ok(Embedding {
            vector,
            model,
            dimensions,
        })
    }

    /// Generate embeddings for a batch of texts, in chunks of `batch_size`.
    ///
    /// Any failing chunk fails the whole call; partial results are discarded.
    pub fn embed_many(
        &self,
        texts: &[String],
        requested_model: Option<&str>,
        normalize: bool,
    ) -> Result<BatchEmbeddings> {
        if texts.is_empty() {
            return Err(EmbeddingError::Validation(
                "Texts list cannot be empty".to_string(),
            ));
        }
        if texts.iter().all(|text| text.is_empty()) {
            return Err(EmbeddingError::Validation(
                "Texts list must contain at least one non-empty text".to_string(),
            ));
        }

        let loaded = self.acquire(requested_model)?;
        let model = loaded.metadata.name.clone();
        let count = texts.len();

        let inference_error = |reason: String| EmbeddingError::Inference {
            model: model.clone(),
            count,
            reason,
        };

        let processed: Vec<String> = texts
            .iter()
            .map(|text| self.truncate(text).to_string())
            .collect();

        let mut vectors = Vec::with_capacity(count);
        for (index, chunk) in processed.chunks(self.batch_size).enumerate() {
            tracing::debug!(
                "Processing batch {} with {} texts",
                index + 1,
                chunk.len()
            );

            let chunk_vectors = loaded
                .model
                .encode(chunk, normalize)
                .map_err(|e| inference_error(format!("{:#}", e)))?;

            if chunk_vectors.len() != chunk.len() {
                return Err(inference_error(format!(
                    "model returned {} embeddings for {} texts",
                    chunk_vectors.len(),
                    chunk.len()
                )));
            }

            vectors.extend(chunk_vectors);
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(position) = vectors.iter().position(|v| v.len() != dimensions) {
            return Err(inference_error(format!(
                "embedding {} has {} dimensions, expected {}",
                position,
                vectors[position].len(),
                dimensions
            )));
        }

        tracing::info!(
            "Generated {} embeddings with {}, dimensions: {}",
            vectors.len(),
            model,
            dimensions
        );

        Ok(BatchEmbeddings {
            vectors,
            model,
            dimensions,
        })
    }

    /// Load the default model if needed and return its metadata.
    pub fn ensure_default_loaded(&self) -> Result<ModelMetadata> {
        let default = self.default_model();
        self.models
            .get_or_load(default)
            .map(|loaded| loaded.metadata)
            .map_err(|e| EmbeddingError::unavailable(default, &e))
    }

    /// Resolve the requested name and obtain the model, falling back to the
    /// default once if the resolved model fails to load.
    fn acquire(&self, requested_model: Option<&str>) -> Result<LoadedModel> {
        let canonical = self.names.resolve(requested_model);
        let default = self.default_model();

        match self.models.get_or_load(&canonical) {
            Ok(loaded) => Ok(loaded),
            Err(e) if canonical != default => {
                tracing::warn!(
                    "Failed to load model '{}': {}. Falling back to default model: {}",
                    canonical,
                    e,
                    default
                );
                self.models
                    .get_or_load(default)
                    .map_err(|e| EmbeddingError::unavailable(default, &e))
            }
            Err(e) => Err(EmbeddingError::unavailable(&canonical, &e)),
        }
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        let truncated = truncate_chars(text, self.max_text_length);
        if truncated.len() < text.len() {
            tracing::warn!(
                "Text truncated from {} to {} characters",
                text.chars().count(),
                self.max_text_length
            );
        }
        truncated
    }
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
