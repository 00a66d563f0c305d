#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;

use embedding_service::models::{DeviceKind, EmbeddingModel, ModelProvider};
use embedding_service::{
    router, AppState, EmbeddingService, LoadError, ModelManager, Settings,
};

pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Deterministic model: every component is the character count of the input.
pub struct FakeModel {
    pub dimensions: usize,
    pub fail: bool,
}

impl EmbeddingModel for FakeModel {
    fn encode(&self, texts: &[String], normalize: bool) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail {
            anyhow::bail!("out of memory while encoding");
        }
        Ok(texts
            .iter()
            .map(|text| {
                let value = text.chars().count() as f32;
                let mut v = vec![value; self.dimensions];
                if normalize {
                    let norm = (value * value * self.dimensions as f32).sqrt();
                    if norm > 0.0 {
                        v.iter_mut().for_each(|x| *x /= norm);
                    }
                }
                v
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_sequence_length(&self) -> usize {
        256
    }
}

/// Provider with a fixed set of known models and their dimensions.
pub struct FakeProvider {
    pub known: HashMap<String, usize>,
    pub broken: HashSet<String>,
    pub failing: HashSet<String>,
    pub loads: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        let mut known = HashMap::new();
        known.insert(DEFAULT_MODEL.to_string(), 384);
        known.insert("all-mpnet-base-v2".to_string(), 768);
        Self {
            known,
            broken: HashSet::new(),
            failing: HashSet::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn broken(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }

    /// `name` loads, but every encode call on it fails.
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelProvider for FakeProvider {
    fn load(&self, name: &str, _device: DeviceKind) -> Result<Arc<dyn EmbeddingModel>, LoadError> {
        if self.broken.contains(name) {
            return Err(LoadError::Runtime("backend failed to initialize".to_string()));
        }
        match self.known.get(name) {
            Some(&dimensions) => {
                self.loads.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(FakeModel {
                    dimensions,
                    fail: self.failing.contains(name),
                }))
            }
            None => Err(LoadError::failed(name, "repository not found")),
        }
    }

    fn gpu_available(&self) -> bool {
        false
    }
}

pub struct TestApp {
    pub app: Router,
    pub provider: Arc<FakeProvider>,
    pub models: Arc<ModelManager>,
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.embedding_model = DEFAULT_MODEL.to_string();
    settings.environment = embedding_service::config::Environment::Development;
    settings.device = DeviceKind::Cpu;
    settings.batch_size = 2;
    settings.max_text_length = 512;
    settings.max_batch_size = 100;
    settings.max_input_length = 5000;
    settings.model_cache_size = 2;
    settings.normalize_embeddings = false;
    settings.request_timeout_secs = None;
    settings.supported_models = DEFAULT_MODEL.to_string();
    settings.cors_origins = "*".to_string();
    settings
}

pub fn test_app(provider: FakeProvider) -> TestApp {
    test_app_with(provider, test_settings())
}

pub fn test_app_with(provider: FakeProvider, settings: Settings) -> TestApp {
    let provider = Arc::new(provider);
    let models = Arc::new(ModelManager::new(
        provider.clone() as Arc<dyn ModelProvider>,
        settings.model_cache_size,
        settings.device,
    ));
    let service = Arc::new(EmbeddingService::new(
        models.clone(),
        settings.embedding_config(),
    ));
    let app = router(Arc::new(AppState::new(service, settings)));
    TestApp {
        app,
        provider,
        models,
    }
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
