//! Health check endpoints

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use super::error::ApiError;
use super::AppState;
use crate::models::{DeviceKind, ModelMetadata};

const SERVICE_NAME: &str = "embedding-service";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    /// Default model metadata, present once it has been loaded
    pub model: Option<ModelMetadata>,
    pub device: DeviceKind,
    pub message: &'static str,
}

/// Handler for `GET /health`
///
/// Always healthy while the process serves requests; never triggers a model load.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let models = state.service.models();
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        model: models.try_get_metadata(state.service.default_model()),
        device: models.device(),
        message: "Service is running",
    })
}

/// Handler for `GET /health/ready`
///
/// Loads the default model if needed; 503 if it can't be loaded.
pub async fn ready(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let expose = state.expose_details();
    let service = state.service.clone();

    let metadata = tokio::task::spawn_blocking(move || service.ensure_default_loaded())
        .await
        .map_err(|e| ApiError::task_failed(e, expose))?
        .map_err(|e| ApiError::from_embedding(e, expose))?;

    Ok(Json(HealthResponse {
        status: "ready",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        device: metadata.device,
        model: Some(metadata),
        message: "Service is ready to process requests",
    }))
}
