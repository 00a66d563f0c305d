use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationParams};

use crate::mpnet::{MpNetConfig, MpNetModel};

/// The subset of `config.json` needed to pick an architecture and describe its output.
#[derive(Debug, Deserialize)]
struct ModelShape {
    hidden_size: usize,
    max_position_embeddings: usize,
    #[serde(default)]
    model_type: Option<String>,
    #[serde(default)]
    architectures: Vec<String>,
    #[serde(default)]
    pad_token_id: Option<u32>,
}

impl ModelShape {
    fn is_mpnet(&self) -> bool {
        self.model_type.as_deref() == Some("mpnet")
            || self.architectures.iter().any(|a| a.contains("MPNet"))
    }

    /// Token id used to pad shorter sequences in a batch.
    fn pad_token_id(&self) -> u32 {
        match self.pad_token_id {
            Some(id) => id,
            None if self.is_mpnet() => 1,
            None => 0,
        }
    }

    /// Longest input the position embeddings can address.
    fn position_limit(&self) -> usize {
        if self.is_mpnet() {
            // Positions start after the padding index
            self.max_position_embeddings
                .saturating_sub(self.pad_token_id() as usize + 1)
        } else {
            self.max_position_embeddings
        }
    }
}

/// `sentence_bert_config.json`, shipped by sentence-transformers repositories.
#[derive(Debug, Deserialize)]
struct SentenceBertConfig {
    max_seq_length: Option<usize>,
}

/// Transformer stack behind the embedder, chosen from `config.json`.
enum Encoder {
    Bert(BertModel),
    MpNet(MpNetModel),
}

impl Encoder {
    fn load(vb: VarBuilder, shape: &ModelShape, config_json: &str) -> Result<Self> {
        if shape.is_mpnet() {
            let config: MpNetConfig =
                serde_json::from_str(config_json).context("Failed to parse MPNet config.json")?;
            let model = MpNetModel::load(vb, &config).context("Failed to build MPNet model")?;
            Ok(Encoder::MpNet(model))
        } else {
            let config: Config =
                serde_json::from_str(config_json).context("Failed to parse BERT config.json")?;
            let model = BertModel::load(vb, &config).context("Failed to build BERT model")?;
            Ok(Encoder::Bert(model))
        }
    }

    /// Final hidden states for a right-padded batch.
    fn forward(&self, token_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let hidden = match self {
            Encoder::Bert(model) => {
                // Attention mask stays U32: BertModel converts it internally when
                // building the extended mask.
                let token_type_ids = token_ids.zeros_like()?;
                model.forward(token_ids, &token_type_ids, Some(attention_mask))?
            }
            Encoder::MpNet(model) => model.forward(token_ids, attention_mask)?,
        };
        Ok(hidden)
    }
}

/// A loaded sentence-transformer: encoder, tokenizer and the device both live on.
///
/// Produces one vector per input text by mean-pooling the final hidden states
/// over real (non-padding) tokens, optionally L2-normalized.
pub struct SentenceEmbedder {
    encoder: Encoder,
    tokenizer: Tokenizer,
    device: Device,
    dimensions: usize,
    max_sequence_length: usize,
    pad_token_id: u32,
}

impl SentenceEmbedder {
    /// Load a model from in-memory files.
    ///
    /// # Arguments
    /// * `config_json` - JSON string containing model config
    /// * `tokenizer_json` - JSON string containing tokenizer config
    /// * `model_weights` - Byte slice containing model weights (safetensors format)
    /// * `sentence_config_json` - Optional `sentence_bert_config.json`, used to cap sequence length
    /// * `device` - Device to place the weights on
    pub fn load(
        config_json: &str,
        tokenizer_json: &str,
        model_weights: &[u8],
        sentence_config_json: Option<&str>,
        device: &Device,
    ) -> Result<Self> {
        let shape: ModelShape =
            serde_json::from_str(config_json).context("Failed to read model shape from config.json")?;

        let mut max_sequence_length = shape.position_limit();
        if let Some(json) = sentence_config_json {
            let sentence_config: SentenceBertConfig = serde_json::from_str(json)
                .context("Failed to parse sentence_bert_config.json")?;
            if let Some(limit) = sentence_config.max_seq_length {
                max_sequence_length = max_sequence_length.min(limit);
            }
        }

        let mut tokenizer = Tokenizer::from_bytes(tokenizer_json.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        // Padding is applied per batch below; fixed padding from tokenizer.json
        // changes the embeddings the encoder produces.
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_sequence_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        let vb = VarBuilder::from_buffered_safetensors(model_weights.to_vec(), DType::F32, device)?;
        let encoder = Encoder::load(vb, &shape, config_json)?;

        tracing::debug!(
            architecture = if shape.is_mpnet() { "mpnet" } else { "bert" },
            dimensions = shape.hidden_size,
            max_sequence_length,
            "Sentence embedder loaded"
        );

        Ok(Self {
            encoder,
            tokenizer,
            device: device.clone(),
            dimensions: shape.hidden_size,
            max_sequence_length,
            pad_token_id: shape.pad_token_id(),
        })
    }

    /// Load model from a directory containing config.json, tokenizer.json and model.safetensors.
    ///
    /// `sentence_bert_config.json` is read as well when present.
    pub fn load_from_dir(model_dir: &std::path::Path, device: &Device) -> Result<Self> {
        use std::fs;

        let config_path = model_dir.join("config.json");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let weights_path = model_dir.join("model.safetensors");
        let sentence_config_path = model_dir.join("sentence_bert_config.json");

        let config_json = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let tokenizer_json = fs::read_to_string(&tokenizer_path)
            .with_context(|| format!("Failed to read {}", tokenizer_path.display()))?;

        let model_weights = fs::read(&weights_path)
            .with_context(|| format!("Failed to read {}", weights_path.display()))?;

        let sentence_config_json = if sentence_config_path.exists() {
            Some(fs::read_to_string(&sentence_config_path).with_context(|| {
                format!("Failed to read {}", sentence_config_path.display())
            })?)
        } else {
            None
        };

        Self::load(
            &config_json,
            &tokenizer_json,
            &model_weights,
            sentence_config_json.as_deref(),
            device,
        )
    }

    /// Embedding dimension (the encoder's hidden size).
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Maximum number of tokens per input; longer inputs are truncated by the tokenizer.
    pub fn max_sequence_length(&self) -> usize {
        self.max_sequence_length
    }

    /// Encode a single text into an embedding vector.
    pub fn encode(&self, text: &str, normalize: bool) -> Result<Vec<f32>> {
        let mut vectors = self.encode_batch(&[text.to_string()], normalize)?;
        vectors
            .pop()
            .context("Model produced no embedding for input text")
    }

    /// Encode multiple texts as one padded batch.
    ///
    /// Output vectors are positionally aligned with `texts`.
    pub fn encode_batch(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(text.as_str(), true)
                    .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let max_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);

        let mut all_token_ids = Vec::with_capacity(encodings.len());
        let mut all_masks = Vec::with_capacity(encodings.len());

        for encoding in &encodings {
            let mut tokens = encoding.get_ids().to_vec();
            let mut mask = vec![1u32; tokens.len()];

            tokens.resize(max_len, self.pad_token_id);
            mask.resize(max_len, 0);

            all_token_ids.push(tokens);
            all_masks.push(mask);
        }

        let token_ids = Tensor::new(all_token_ids, &self.device)?;
        let attention_mask = Tensor::new(all_masks, &self.device)?;

        let output = self.encoder.forward(&token_ids, &attention_mask)?;

        let attention_mask_f32 = attention_mask.to_dtype(DType::F32)?;
        let mut pooled = mean_pool(&output, &attention_mask_f32)?;

        if normalize {
            pooled = l2_normalize(&pooled)?;
        }

        pooled
            .to_vec2::<f32>()
            .context("Failed to convert embeddings to vectors")
    }
}

/// Mean pooling: average token embeddings weighted by attention mask
///
/// Padding tokens carry a zero mask and do not contribute to the average.
///
/// See: https://www.sbert.net/docs/usage/computing_sentence_embeddings.html
pub(crate) fn mean_pool(token_embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    // token_embeddings: [batch_size, seq_len, hidden_size]
    // attention_mask:   [batch_size, seq_len]
    let (batch, seq_len, hidden) = token_embeddings.dims3()?;
    let mask_expanded = attention_mask
        .unsqueeze(2)?
        .broadcast_as((batch, seq_len, hidden))?
        .to_dtype(DType::F32)?;

    let sum_embeddings = token_embeddings.mul(&mask_expanded)?.sum(1)?;

    // Clamp to avoid dividing by zero for an all-padding row
    let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

    Ok(sum_embeddings.broadcast_div(&sum_mask)?)
}

/// Scale each row to unit L2 norm so cosine similarity reduces to a dot product.
pub(crate) fn l2_normalize(embeddings: &Tensor) -> Result<Tensor> {
    let norm = embeddings
        .sqr()?
        .sum_keepdim(embeddings.rank() - 1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?;

    embeddings
        .broadcast_div(&norm)
        .context("Normalization failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `config.json` of sentence-transformers/all-mpnet-base-v2
    const MPNET_CONFIG: &str = r#"{
        "_name_or_path": "microsoft/mpnet-base",
        "architectures": ["MPNetForMaskedLM"],
        "attention_probs_dropout_prob": 0.1,
        "bos_token_id": 0,
        "eos_token_id": 2,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.1,
        "hidden_size": 768,
        "initializer_range": 0.02,
        "intermediate_size": 3072,
        "layer_norm_eps": 1e-05,
        "max_position_embeddings": 514,
        "model_type": "mpnet",
        "num_attention_heads": 12,
        "num_hidden_layers": 12,
        "pad_token_id": 1,
        "relative_attention_num_buckets": 32,
        "vocab_size": 30527
    }"#;

    const BERT_CONFIG: &str = r#"{
        "architectures": ["BertModel"],
        "attention_probs_dropout_prob": 0.1,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.1,
        "hidden_size": 8,
        "initializer_range": 0.02,
        "intermediate_size": 16,
        "layer_norm_eps": 1e-12,
        "max_position_embeddings": 16,
        "model_type": "bert",
        "num_attention_heads": 2,
        "num_hidden_layers": 1,
        "pad_token_id": 0,
        "position_embedding_type": "absolute",
        "type_vocab_size": 2,
        "use_cache": true,
        "vocab_size": 32
    }"#;

    #[test]
    fn test_mpnet_config_detected() {
        let shape: ModelShape = serde_json::from_str(MPNET_CONFIG).unwrap();

        assert!(shape.is_mpnet());
        assert_eq!(shape.pad_token_id(), 1);
        assert_eq!(shape.position_limit(), 512);
        assert!(serde_json::from_str::<MpNetConfig>(MPNET_CONFIG).is_ok());
    }

    #[test]
    fn test_bert_config_detected() {
        let shape: ModelShape = serde_json::from_str(BERT_CONFIG).unwrap();

        assert!(!shape.is_mpnet());
        assert_eq!(shape.pad_token_id(), 0);
        assert_eq!(shape.position_limit(), 16);
    }

    #[test]
    fn test_encoder_follows_architecture() {
        let device = Device::Cpu;
        // Same shape as all-mpnet-base-v2 but tiny; note there is no type_vocab_size
        let tiny_mpnet = r#"{
            "model_type": "mpnet",
            "hidden_size": 8,
            "intermediate_size": 16,
            "max_position_embeddings": 18,
            "num_attention_heads": 2,
            "num_hidden_layers": 1,
            "vocab_size": 32
        }"#;

        let shape: ModelShape = serde_json::from_str(tiny_mpnet).unwrap();
        let encoder = Encoder::load(VarBuilder::zeros(DType::F32, &device), &shape, tiny_mpnet).unwrap();
        assert!(matches!(encoder, Encoder::MpNet(_)));

        let shape: ModelShape = serde_json::from_str(BERT_CONFIG).unwrap();
        let encoder = Encoder::load(VarBuilder::zeros(DType::F32, &device), &shape, BERT_CONFIG).unwrap();
        assert!(matches!(encoder, Encoder::Bert(_)));

        let token_ids = Tensor::new(&[[2u32, 7, 3]], &device).unwrap();
        let mask = Tensor::new(&[[1u32, 1, 1]], &device).unwrap();
        let hidden = encoder.forward(&token_ids, &mask).unwrap();
        assert_eq!(hidden.dims(), &[1, 3, 8]);
    }

    #[test]
    fn test_mean_pool_ignores_padding() {
        let device = Device::Cpu;
        // One sequence of three tokens, the last one padding
        let embeddings = Tensor::new(
            &[[[1.0f32, 2.0], [3.0, 4.0], [100.0, 100.0]]],
            &device,
        )
        .unwrap();
        let mask = Tensor::new(&[[1.0f32, 1.0, 0.0]], &device).unwrap();

        let pooled = mean_pool(&embeddings, &mask).unwrap().to_vec2::<f32>().unwrap();

        assert_eq!(pooled, vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn test_mean_pool_keeps_batch_rows_separate() {
        let device = Device::Cpu;
        let embeddings = Tensor::new(
            &[[[1.0f32, 1.0], [3.0, 3.0]], [[10.0, 0.0], [0.0, 0.0]]],
            &device,
        )
        .unwrap();
        let mask = Tensor::new(&[[1.0f32, 1.0], [1.0, 0.0]], &device).unwrap();

        let pooled = mean_pool(&embeddings, &mask).unwrap().to_vec2::<f32>().unwrap();

        assert_eq!(pooled, vec![vec![2.0, 2.0], vec![10.0, 0.0]]);
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let device = Device::Cpu;
        let embeddings = Tensor::new(&[[3.0f32, 4.0], [0.0, 2.0]], &device).unwrap();

        let normalized = l2_normalize(&embeddings).unwrap().to_vec2::<f32>().unwrap();

        assert!((normalized[0][0] - 0.6).abs() < 1e-6);
        assert!((normalized[0][1] - 0.8).abs() < 1e-6);
        assert!((normalized[1][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_stays_finite() {
        let device = Device::Cpu;
        let embeddings = Tensor::new(&[[0.0f32, 0.0]], &device).unwrap();

        let normalized = l2_normalize(&embeddings).unwrap().to_vec2::<f32>().unwrap();

        assert!(normalized[0].iter().all(|v| v.is_finite()));
    }
}
