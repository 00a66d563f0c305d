//! Embedding service binary.
//!
//! Serves:
//! - `POST /api/v1/embeddings/generate` single-text embeddings
//! - `POST /api/v1/embeddings/batch` batch embeddings
//! - `GET  /api/v1/embeddings/models` loaded and supported models
//! - `GET  /api/v1/health`, `/api/v1/health/ready` health and readiness

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use embedding_service::{
    router, AppState, CandleProvider, EmbeddingService, ModelManager, Settings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    settings.validate()?;

    let provider = Arc::new(CandleProvider::new(
        &settings.models_dir,
        tokio::runtime::Handle::current(),
    ));
    let models = Arc::new(ModelManager::new(
        provider,
        settings.model_cache_size,
        settings.device,
    ));
    let service = Arc::new(EmbeddingService::new(
        models.clone(),
        settings.embedding_config(),
    ));

    let addr: SocketAddr = format!("{}:{}", settings.api_host, settings.api_port).parse()?;

    tracing::info!("Starting Embedding Service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Default model: {}", settings.embedding_model);
    tracing::info!("Device: {}", settings.device);
    tracing::info!("Model will be loaded on first request");

    let app = router(Arc::new(AppState::new(service, settings)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    models.clear();
    tracing::info!("Shutting down Embedding Service");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
