use once_cell::sync::Lazy;
use semantic_embeddings::{Device, SentenceEmbedder};
use std::path::PathBuf;

/// Directory holding config.json, tokenizer.json and model.safetensors for all-MiniLM-L6-v2.
pub fn model_dir() -> PathBuf {
    std::env::var_os("SEMANTIC_EMBEDDINGS_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/all-MiniLM-L6-v2")
        })
}

// Shared model instance loaded once for all tests
pub static TEST_MODEL: Lazy<SentenceEmbedder> = Lazy::new(|| {
    SentenceEmbedder::load_from_dir(&model_dir(), &Device::Cpu).expect("Failed to load model")
});

pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
