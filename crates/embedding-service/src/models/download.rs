//! Model downloading from Hugging Face.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Files a model directory must contain before it can be loaded.
pub(crate) const MODEL_FILES: &[&str] = &["config.json", "tokenizer.json", "model.safetensors"];

/// Files fetched when the repository has them; a 404 is not an error.
const OPTIONAL_FILES: &[&str] = &["sentence_bert_config.json"];

/// Files smaller than this are treated as truncated downloads.
const MIN_VALID_SIZE: u64 = 100;

/// Hugging Face repository for a canonical model name.
///
/// Bare names (`all-MiniLM-L6-v2`) live under the sentence-transformers organisation.
pub fn repository_for(name: &str) -> String {
    if name.contains('/') {
        name.to_string()
    } else {
        format!("sentence-transformers/{}", name)
    }
}

/// Directory name used for a model under the models directory.
pub fn directory_for(name: &str) -> String {
    repository_for(name).replace('/', "--")
}

/// Download `repo` into `model_dir` unless the files are already there.
pub async fn download_model(repo: &str, model_dir: &Path) -> Result<()> {
    if !model_dir.exists() {
        fs::create_dir_all(model_dir).await?;
        tracing::info!("Created model directory: {}", model_dir.display());
    }

    if check_model_files(model_dir).await {
        tracing::debug!("Model {} already downloaded", repo);
        return Ok(());
    }

    tracing::info!("Downloading {} from Hugging Face...", repo);

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;

    for file in MODEL_FILES {
        let dest_path = model_dir.join(file);

        if is_valid_file(&dest_path).await {
            tracing::debug!("{} already exists, skipping", file);
            continue;
        }

        let url = file_url(repo, file);
        tracing::info!("Downloading {}...", file);

        download_file(&client, &url, &dest_path)
            .await
            .with_context(|| format!("Failed to download {} from {}", file, repo))?;
    }

    for file in OPTIONAL_FILES {
        let dest_path = model_dir.join(file);
        if dest_path.exists() {
            continue;
        }

        let url = file_url(repo, file);
        if let Err(e) = download_file(&client, &url, &dest_path).await {
            tracing::debug!("Optional file {} not available: {:#}", file, e);
            let _ = fs::remove_file(dest_path.with_extension("part")).await;
        }
    }

    optimize_tokenizer(model_dir).await?;

    tracing::info!("Model {} download complete", repo);
    Ok(())
}

fn file_url(repo: &str, file: &str) -> String {
    format!("https://huggingface.co/{}/resolve/main/{}", repo, file)
}

/// Check if all required model files exist and are valid.
pub(crate) async fn check_model_files(model_dir: &Path) -> bool {
    for file in MODEL_FILES {
        if !is_valid_file(&model_dir.join(file)).await {
            return false;
        }
    }
    true
}

async fn is_valid_file(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(meta) if meta.len() > MIN_VALID_SIZE)
}

/// Stream a single file to disk, writing to a temporary name first.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .with_context(|| format!("HTTP error downloading {}", url))?;

    let total_size = response.content_length();
    let mut stream = response.bytes_stream();

    let partial = dest.with_extension("part");
    let mut file = File::create(&partial).await?;
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        // Log progress for large files
        if let Some(total) = total_size {
            if total > 1_000_000 && downloaded % 10_000_000 < chunk.len() as u64 {
                let percent = (downloaded as f64 / total as f64) * 100.0;
                tracing::info!("  Progress: {:.1}%", percent);
            }
        }
    }

    file.flush().await?;
    drop(file);
    fs::rename(&partial, dest).await?;
    Ok(())
}

/// Remove fixed padding configuration from tokenizer.json.
///
/// Hugging Face's tokenizer.json may contain `padding: { strategy: { Fixed: 128 } }`.
/// sentence-transformers ignores it, and candle's BERT produces different embeddings
/// when every sequence is padded to the fixed length.
pub(crate) async fn optimize_tokenizer(model_dir: &Path) -> Result<()> {
    let tokenizer_path = model_dir.join("tokenizer.json");

    let content = fs::read_to_string(&tokenizer_path).await?;
    let mut data: serde_json::Value = serde_json::from_str(&content)?;

    let has_padding = data.get("padding").is_some_and(|p| !p.is_null());
    if let (true, Some(obj)) = (has_padding, data.as_object_mut()) {
        tracing::info!("Removing fixed padding configuration from tokenizer.json");
        obj.remove("padding");
        fs::write(&tokenizer_path, serde_json::to_string_pretty(&data)?).await?;
    }

    Ok(())
}
