//! HTTP API, mounted under `/api/v1`.

pub mod embeddings;
pub mod error;
pub mod health;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{AllowedOrigins, Settings};
use crate::service::EmbeddingService;

pub use error::ApiError;

/// Shared application state
pub struct AppState {
    pub service: Arc<EmbeddingService>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(service: Arc<EmbeddingService>, settings: Settings) -> Self {
        Self { service, settings }
    }

    /// Whether error responses may include internal details.
    pub fn expose_details(&self) -> bool {
        self.settings.is_development()
    }
}

/// Build the application router with CORS, tracing and the optional request timeout.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/embeddings/generate", post(embeddings::generate))
        .route("/embeddings/batch", post(embeddings::batch))
        .route("/embeddings/models", get(embeddings::list_models))
        .route("/health", get(health::health))
        .route("/health/", get(health::health))
        .route("/health/ready", get(health::ready));

    let mut app = Router::new()
        .nest("/api/v1", api)
        .layer(cors_layer(&state.settings))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    if let Some(timeout) = state.settings.request_timeout() {
        app = app.layer(TimeoutLayer::new(timeout));
    }

    app
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    match settings.allowed_origins() {
        AllowedOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        AllowedOrigins::List(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                        None
                    }
                })
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
                .allow_credentials(true)
        }
    }
}
