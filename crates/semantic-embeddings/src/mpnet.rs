//! MPNet encoder (all-mpnet-base-v2 and friends).
//!
//! Same layer stack as BERT, but without token type embeddings and with a
//! learned relative position bias shared by every attention layer. Position
//! ids start after the padding index, as in RoBERTa-style vocabularies.

use candle_core::{DType, Module, Result, Tensor};
use candle_nn::{embedding, layer_norm, linear, Embedding, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;

const MAX_RELATIVE_DISTANCE: usize = 128;

#[derive(Debug, Clone, Deserialize)]
pub struct MpNetConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub max_position_embeddings: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    #[serde(default = "default_relative_buckets")]
    pub relative_attention_num_buckets: usize,
    #[serde(default = "default_pad_token_id")]
    pub pad_token_id: u32,
}

fn default_layer_norm_eps() -> f64 {
    1e-5
}

fn default_relative_buckets() -> usize {
    32
}

fn default_pad_token_id() -> u32 {
    1
}

struct MpNetEmbeddings {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    layer_norm: LayerNorm,
}

impl MpNetEmbeddings {
    fn load(vb: VarBuilder, config: &MpNetConfig) -> Result<Self> {
        Ok(Self {
            word_embeddings: embedding(config.vocab_size, config.hidden_size, vb.pp("word_embeddings"))?,
            position_embeddings: embedding(
                config.max_position_embeddings,
                config.hidden_size,
                vb.pp("position_embeddings"),
            )?,
            layer_norm: layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    fn forward(&self, input_ids: &Tensor, position_ids: &Tensor) -> Result<Tensor> {
        let words = self.word_embeddings.forward(input_ids)?;
        let positions = self.position_embeddings.forward(position_ids)?;
        self.layer_norm.forward(&(words + positions)?)
    }
}

struct MpNetAttention {
    q: Linear,
    k: Linear,
    v: Linear,
    o: Linear,
    layer_norm: LayerNorm,
    num_heads: usize,
    head_dim: usize,
}

impl MpNetAttention {
    fn load(vb: VarBuilder, config: &MpNetConfig) -> Result<Self> {
        let hidden = config.hidden_size;
        let attn = vb.pp("attn");
        Ok(Self {
            q: linear(hidden, hidden, attn.pp("q"))?,
            k: linear(hidden, hidden, attn.pp("k"))?,
            v: linear(hidden, hidden, attn.pp("v"))?,
            o: linear(hidden, hidden, attn.pp("o"))?,
            layer_norm: layer_norm(hidden, config.layer_norm_eps, vb.pp("LayerNorm"))?,
            num_heads: config.num_attention_heads,
            head_dim: hidden / config.num_attention_heads,
        })
    }

    /// `bias` is the relative position bias plus the padding mask, `[batch, heads, seq, seq]`.
    fn forward(&self, hidden_states: &Tensor, bias: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = hidden_states.dims3()?;
        let heads = |t: Tensor| -> Result<Tensor> {
            t.reshape((batch, seq_len, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };

        let q = heads(self.q.forward(hidden_states)?)?;
        let k = heads(self.k.forward(hidden_states)?)?;
        let v = heads(self.v.forward(hidden_states)?)?;

        let scores = (q.matmul(&k.t()?)? / (self.head_dim as f64).sqrt())?;
        let probs = candle_nn::ops::softmax_last_dim(&scores.broadcast_add(bias)?)?;

        let context = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq_len, self.num_heads * self.head_dim))?;

        let output = self.o.forward(&context)?;
        self.layer_norm.forward(&(output + hidden_states)?)
    }
}

struct MpNetLayer {
    attention: MpNetAttention,
    intermediate: Linear,
    output: Linear,
    output_norm: LayerNorm,
}

impl MpNetLayer {
    fn load(vb: VarBuilder, config: &MpNetConfig) -> Result<Self> {
        Ok(Self {
            attention: MpNetAttention::load(vb.pp("attention"), config)?,
            intermediate: linear(
                config.hidden_size,
                config.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            output: linear(
                config.intermediate_size,
                config.hidden_size,
                vb.pp("output").pp("dense"),
            )?,
            output_norm: layer_norm(
                config.hidden_size,
                config.layer_norm_eps,
                vb.pp("output").pp("LayerNorm"),
            )?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, bias: &Tensor) -> Result<Tensor> {
        let attended = self.attention.forward(hidden_states, bias)?;
        let intermediate = self.intermediate.forward(&attended)?.gelu_erf()?;
        let output = self.output.forward(&intermediate)?;
        self.output_norm.forward(&(output + attended)?)
    }
}

pub struct MpNetModel {
    embeddings: MpNetEmbeddings,
    layers: Vec<MpNetLayer>,
    relative_attention_bias: Embedding,
    num_buckets: usize,
    pad_token_id: u32,
}

impl MpNetModel {
    /// Load weights saved either bare (`embeddings.*`) or under an `mpnet.` prefix.
    pub fn load(vb: VarBuilder, config: &MpNetConfig) -> Result<Self> {
        let vb = if vb.contains_tensor("embeddings.word_embeddings.weight") {
            vb
        } else {
            vb.pp("mpnet")
        };

        let encoder = vb.pp("encoder");
        let layers = (0..config.num_hidden_layers)
            .map(|i| MpNetLayer::load(encoder.pp(format!("layer.{i}")), config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            embeddings: MpNetEmbeddings::load(vb.pp("embeddings"), config)?,
            layers,
            relative_attention_bias: embedding(
                config.relative_attention_num_buckets,
                config.num_attention_heads,
                encoder.pp("relative_attention_bias"),
            )?,
            num_buckets: config.relative_attention_num_buckets,
            pad_token_id: config.pad_token_id,
        })
    }

    /// Final hidden states, `[batch, seq, hidden]`.
    ///
    /// `attention_mask` is `[batch, seq]` with 1 for real tokens; batches are right-padded.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let (_, seq_len) = input_ids.dims2()?;
        let device = input_ids.device();

        let mask = attention_mask.to_dtype(DType::F32)?;
        let position_ids = (mask.cumsum(1)? * &mask)?
            .affine(1.0, self.pad_token_id as f64)?
            .to_dtype(DType::U32)?;

        let buckets = relative_position_buckets(seq_len, self.num_buckets);
        let buckets = Tensor::from_vec(buckets, (seq_len, seq_len), device)?;
        let position_bias = self
            .relative_attention_bias
            .forward(&buckets)?
            .permute((2, 0, 1))?
            .unsqueeze(0)?;

        let mask_bias = mask
            .affine(-1.0, 1.0)?
            .affine(f32::MIN as f64, 0.0)?
            .unsqueeze(1)?
            .unsqueeze(1)?;
        let bias = position_bias.broadcast_add(&mask_bias)?;

        let mut hidden_states = self.embeddings.forward(input_ids, &position_ids)?;
        for layer in &self.layers {
            hidden_states = layer.forward(&hidden_states, &bias)?;
        }
        Ok(hidden_states)
    }
}

/// Bucket index for every (query, key) pair, row-major `[seq, seq]`.
fn relative_position_buckets(seq_len: usize, num_buckets: usize) -> Vec<u32> {
    let mut buckets = Vec::with_capacity(seq_len * seq_len);
    for query in 0..seq_len {
        for key in 0..seq_len {
            let relative = key as i64 - query as i64;
            buckets.push(relative_position_bucket(relative, num_buckets, MAX_RELATIVE_DISTANCE));
        }
    }
    buckets
}

/// Half the buckets for keys before the query and half for keys after it.
/// Within each half, small distances get exact buckets and larger ones are
/// log-spaced up to `max_distance`.
fn relative_position_bucket(relative_position: i64, num_buckets: usize, max_distance: usize) -> u32 {
    let half = (num_buckets / 2) as i64;
    let n = -relative_position;

    let mut bucket = if n < 0 { half } else { 0 };
    let n = n.abs();

    let max_exact = half / 2;
    if n < max_exact {
        bucket += n;
    } else {
        let scaled = (n as f64 / max_exact as f64).ln()
            / (max_distance as f64 / max_exact as f64).ln()
            * (half - max_exact) as f64;
        bucket += (max_exact + scaled as i64).min(half - 1);
    }

    bucket as u32
}
