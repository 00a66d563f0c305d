//! Service settings, read once at start-up from flags or environment variables.

use std::time::Duration;

use anyhow::{ensure, Result};
use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;

use crate::models::DeviceKind;
use crate::service::EmbeddingConfig;

/// Deployment environment. Anything but development masks internal error details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 512;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 5000;
pub const DEFAULT_API_HOST: &str = "0.0.0.0";
pub const DEFAULT_API_PORT: u16 = 8001;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_MODEL_CACHE_SIZE: usize = 1;
pub const DEFAULT_FRONTEND_URL: &str = "https://yourdomain.com";
pub const DEFAULT_MODELS_DIR: &str = "./models";

/// Origins the CORS layer should accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Parser, Debug, Clone)]
#[command(name = "embedding-service")]
#[command(about = "HTTP API for generating text embeddings with sentence-transformer models")]
pub struct Settings {
    /// Deployment environment
    #[arg(long, value_enum, default_value = "development", env = "ENVIRONMENT")]
    pub environment: Environment,

    /// Model used when a request names none, and as the fallback when loading fails
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL, env = "EMBEDDING_MODEL")]
    pub embedding_model: String,

    /// Preferred inference device (downgraded to cpu if no GPU is present)
    #[arg(long, value_enum, default_value = "cpu", env = "DEVICE")]
    pub device: DeviceKind,

    /// Number of texts submitted to the model at once
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, env = "BATCH_SIZE")]
    pub batch_size: usize,

    /// Texts longer than this many characters are truncated before inference
    #[arg(long, default_value_t = DEFAULT_MAX_TEXT_LENGTH, env = "MAX_TEXT_LENGTH")]
    pub max_text_length: usize,

    /// Maximum number of texts accepted in one batch request
    #[arg(long, default_value_t = DEFAULT_MAX_BATCH_SIZE, env = "MAX_BATCH_SIZE")]
    pub max_batch_size: usize,

    /// Requests with a text longer than this many characters are rejected
    #[arg(long, default_value_t = DEFAULT_MAX_INPUT_LENGTH, env = "MAX_INPUT_LENGTH")]
    pub max_input_length: usize,

    /// Address to bind to
    #[arg(long, default_value = DEFAULT_API_HOST, env = "API_HOST")]
    pub api_host: String,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_API_PORT, env = "API_PORT")]
    pub api_port: u16,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "LOG_LEVEL")]
    pub log_level: String,

    /// Normalize embeddings when a request doesn't say
    #[arg(long, default_value_t = false, action = ArgAction::Set, env = "NORMALIZE_EMBEDDINGS")]
    pub normalize_embeddings: bool,

    /// Number of models kept loaded in memory
    #[arg(long, default_value_t = DEFAULT_MODEL_CACHE_SIZE, env = "MODEL_CACHE_SIZE")]
    pub model_cache_size: usize,

    /// Comma-separated list of models advertised as supported
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL, env = "SUPPORTED_MODELS")]
    pub supported_models: String,

    /// Comma-separated list of allowed CORS origins, or "*"
    #[arg(long, default_value = "*", env = "CORS_ORIGINS")]
    pub cors_origins: String,

    /// Origin allowed in production when CORS_ORIGINS is "*"
    #[arg(long, default_value = DEFAULT_FRONTEND_URL, env = "FRONTEND_URL")]
    pub frontend_url: String,

    /// Directory where downloaded model files are stored
    #[arg(long, default_value = DEFAULT_MODELS_DIR, env = "MODELS_DIR")]
    pub models_dir: String,

    /// Abort requests that take longer than this many seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

/// Built-in defaults, independent of flags and the process environment.
impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            device: DeviceKind::Cpu,
            batch_size: DEFAULT_BATCH_SIZE,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            api_host: DEFAULT_API_HOST.to_string(),
            api_port: DEFAULT_API_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            normalize_embeddings: false,
            model_cache_size: DEFAULT_MODEL_CACHE_SIZE,
            supported_models: DEFAULT_EMBEDDING_MODEL.to_string(),
            cors_origins: "*".to_string(),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            models_dir: DEFAULT_MODELS_DIR.to_string(),
            request_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.embedding_model.trim().is_empty(), "EMBEDDING_MODEL must not be empty");
        ensure!(self.batch_size >= 1, "BATCH_SIZE must be at least 1");
        ensure!(self.max_text_length >= 1, "MAX_TEXT_LENGTH must be at least 1");
        ensure!(self.max_batch_size >= 1, "MAX_BATCH_SIZE must be at least 1");
        ensure!(self.max_input_length >= 1, "MAX_INPUT_LENGTH must be at least 1");
        ensure!(self.model_cache_size >= 1, "MODEL_CACHE_SIZE must be at least 1");
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn supported_models_list(&self) -> Vec<String> {
        split_list(&self.supported_models)
    }

    pub fn allowed_origins(&self) -> AllowedOrigins {
        if self.cors_origins.trim() != "*" {
            return AllowedOrigins::List(split_list(&self.cors_origins));
        }

        if self.environment == Environment::Production {
            AllowedOrigins::List(vec![self.frontend_url.clone()])
        } else {
            AllowedOrigins::Any
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Default tracing filter when RUST_LOG is unset.
    pub fn log_filter(&self) -> String {
        let level = self.log_level.to_lowercase();
        format!("embedding_service={level},semantic_embeddings={level},tower_http={level}")
    }

    pub fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            default_model: self.embedding_model.clone(),
            batch_size: self.batch_size,
            max_text_length: self.max_text_length,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
