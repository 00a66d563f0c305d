//! Mapping of service errors onto HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::EmbeddingError;

/// Message returned instead of internal details outside development.
const MASKED_MESSAGE: &str = "An internal error occurred";

/// Error body: `{"detail": ..., "errors": [...]}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// 400: the request was understood but its content is invalid.
    #[error("{0}")]
    BadRequest(String),

    /// 422: the body could not be parsed into the expected shape.
    #[error("Validation error: {0}")]
    Unprocessable(String),

    /// 503: no model could be loaded.
    #[error("{0}")]
    Unavailable(String),

    /// 500: anything else.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Convert a service error, masking internal details unless `expose_details`.
    pub fn from_embedding(err: EmbeddingError, expose_details: bool) -> Self {
        match err {
            EmbeddingError::Validation(message) => ApiError::BadRequest(message),
            EmbeddingError::ModelUnavailable { .. } => {
                tracing::error!("Embedding model unavailable: {}", err);
                ApiError::Unavailable(mask(
                    format!("Embedding service unavailable: {}", err),
                    expose_details,
                ))
            }
            EmbeddingError::Inference { .. } => {
                tracing::error!("Error generating embedding: {}", err);
                ApiError::Internal(mask(
                    format!("Failed to generate embedding: {}", err),
                    expose_details,
                ))
            }
        }
    }

    /// A blocking task panicked or was cancelled.
    pub fn task_failed(err: tokio::task::JoinError, expose_details: bool) -> Self {
        tracing::error!("Embedding task failed: {}", err);
        ApiError::Internal(mask(format!("Embedding task failed: {}", err), expose_details))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Unprocessable(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Unprocessable(message) => ErrorBody {
                detail: "Validation error".to_string(),
                errors: vec![message],
            },
            ApiError::BadRequest(message)
            | ApiError::Unavailable(message)
            | ApiError::Internal(message) => ErrorBody {
                detail: message,
                errors: Vec::new(),
            },
        };
        (status, Json(body)).into_response()
    }
}

fn mask(message: String, expose_details: bool) -> String {
    if expose_details {
        message
    } else {
        MASKED_MESSAGE.to_string()
    }
}
