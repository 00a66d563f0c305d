//! Error types for model loading and embedding generation.

use thiserror::Error;

/// The model provider could not produce a usable model.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to load model '{model}': {reason}")]
    Failed { model: String, reason: String },

    #[error("Model '{model}' is not usable: {reason}")]
    InvalidModel { model: String, reason: String },

    #[error("Inference runtime unavailable: {0}")]
    Runtime(String),
}

impl LoadError {
    pub fn failed(model: &str, err: impl std::fmt::Display) -> Self {
        LoadError::Failed {
            model: model.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Errors surfaced by [`crate::EmbeddingService`].
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Caller error: empty or malformed input. Never worth retrying.
    #[error("{0}")]
    Validation(String),

    /// Neither the requested model nor the default could be loaded.
    #[error("Model '{model}' is unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// Encoding failed after a model was obtained.
    #[error("Embedding generation failed with model '{model}' for {count} text(s): {reason}")]
    Inference {
        model: String,
        count: usize,
        reason: String,
    },
}

impl EmbeddingError {
    pub fn unavailable(model: &str, err: &LoadError) -> Self {
        EmbeddingError::ModelUnavailable {
            model: model.to_string(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;
