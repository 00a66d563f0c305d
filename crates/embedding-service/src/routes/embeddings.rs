//! Embedding generation endpoints

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::models::{DeviceKind, ModelMetadata};

/// Request body for `POST /embeddings/generate`
#[derive(Debug, Deserialize)]
pub struct EmbeddingRequest {
    /// Text to generate embedding for
    pub text: String,
    /// Model name (uses the default if not provided)
    #[serde(default)]
    pub model: Option<String>,
    /// Whether to normalize the embedding (falls back to NORMALIZE_EMBEDDINGS)
    #[serde(default)]
    pub normalize: Option<bool>,
}

/// Request body for `POST /embeddings/batch`
#[derive(Debug, Deserialize)]
pub struct EmbeddingBatchRequest {
    pub texts: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub normalize: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
    /// Model actually used, after name mapping and fallback
    pub model: String,
    pub dimensions: usize,
    /// Length of the input text in characters, before truncation
    pub text_length: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingBatchResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub model: String,
    pub dimensions: usize,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub default_model: String,
    pub supported_models: Vec<String>,
    pub loaded_models: Vec<String>,
    pub model_info: Vec<ModelMetadata>,
    pub device: DeviceKind,
}

/// Handler for `POST /embeddings/generate`
pub async fn generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let Json(request) = payload?;
    let max_input = state.settings.max_input_length;

    let text_length = request.text.chars().count();
    if text_length == 0 {
        return Err(ApiError::BadRequest("Text cannot be empty".to_string()));
    }
    if text_length > max_input {
        return Err(ApiError::BadRequest(format!(
            "Text length exceeds maximum of {} characters",
            max_input
        )));
    }

    let normalize = request
        .normalize
        .unwrap_or(state.settings.normalize_embeddings);
    let expose = state.expose_details();
    let service = state.service.clone();

    let embedding = tokio::task::spawn_blocking(move || {
        service.embed_one(&request.text, request.model.as_deref(), normalize)
    })
    .await
    .map_err(|e| ApiError::task_failed(e, expose))?
    .map_err(|e| ApiError::from_embedding(e, expose))?;

    Ok(Json(EmbeddingResponse {
        embedding: embedding.vector,
        model: embedding.model,
        dimensions: embedding.dimensions,
        text_length,
    }))
}

/// Handler for `POST /embeddings/batch`
pub async fn batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EmbeddingBatchRequest>, JsonRejection>,
) -> Result<Json<EmbeddingBatchResponse>, ApiError> {
    let Json(request) = payload?;
    let max_input = state.settings.max_input_length;
    let max_batch = state.settings.max_batch_size;

    if request.texts.len() > max_batch {
        return Err(ApiError::BadRequest(format!(
            "Batch size {} exceeds maximum of {} texts",
            request.texts.len(),
            max_batch
        )));
    }
    if request.texts.iter().any(|t| t.chars().count() > max_input) {
        return Err(ApiError::BadRequest(format!(
            "Text length exceeds maximum of {} characters",
            max_input
        )));
    }

    let normalize = request
        .normalize
        .unwrap_or(state.settings.normalize_embeddings);
    let expose = state.expose_details();
    let service = state.service.clone();

    let result = tokio::task::spawn_blocking(move || {
        service.embed_many(&request.texts, request.model.as_deref(), normalize)
    })
    .await
    .map_err(|e| ApiError::task_failed(e, expose))?
    .map_err(|e| ApiError::from_embedding(e, expose))?;

    Ok(Json(EmbeddingBatchResponse {
        count: result.vectors.len(),
        embeddings: result.vectors,
        model: result.model,
        dimensions: result.dimensions,
    }))
}

/// Handler for `GET /embeddings/models`. Reads cache state without loading anything.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let models = state.service.models();
    let loaded_models = models.list_loaded();
    let model_info = loaded_models
        .iter()
        .filter_map(|name| models.try_get_metadata(name))
        .collect();

    Json(ModelsResponse {
        default_model: state.service.default_model().to_string(),
        supported_models: state.settings.supported_models_list(),
        loaded_models,
        model_info,
        device: models.device(),
    })
}
