//! ONNX Runtime embedding pipeline for sentence-transformers models.
//!
//! Mean-pooled, L2-normalized embeddings (all-MiniLM-L6-v2 gives 384
//! dimensions). The model directory must contain `model.onnx` and
//! `tokenizer.json`.

use std::path::Path;

use async_trait::async_trait;
use risklens_core::{EmbeddingProvider, ModelUnavailable};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::onnx::{EncoderSession, configure_tokenizer, encode_batch, load_tokenizer, model_files};

const MAX_TOKENS: usize = 256;

/// Sentence embedding generator using ONNX Runtime.
pub struct Embedder {
    encoder: EncoderSession,
    tokenizer: Tokenizer,
    dim: usize,
}

impl Embedder {
    /// Load an embedding model from a directory containing `model.onnx` and `tokenizer.json`.
    pub fn load(model_dir: &Path) -> Result<Self, ModelUnavailable> {
        load_inner(model_dir).map_err(|e| ModelUnavailable {
            path: model_dir.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed a batch of texts, returning one normalized vector per input.
    pub fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batch_size = texts.len();
        let batch = encode_batch(&self.tokenizer, texts.to_vec())?;
        let seq_len = batch.seq_len;
        let (dims, output_data) = self.encoder.run(&batch)?;

        // Token embeddings: [batch_size, seq_len, dim].
        anyhow::ensure!(
            dims.len() == 3 && dims[0] as usize == batch_size && dims[2] as usize == self.dim,
            "unexpected output shape: {dims:?}, expected [{batch_size}, {seq_len}, {}]",
            self.dim
        );

        let actual_seq_len = dims[1] as usize;

        let mut embeddings = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let mut pooled = vec![0.0f32; self.dim];
            let mut token_count = 0.0f32;

            for j in 0..actual_seq_len.min(seq_len) {
                let mask_val = batch.attention_mask[i * seq_len + j] as f32;
                if mask_val > 0.0 {
                    let offset = (i * actual_seq_len + j) * self.dim;
                    for (d, p) in pooled.iter_mut().enumerate() {
                        *p += output_data[offset + d] * mask_val;
                    }
                    token_count += mask_val;
                }
            }

            if token_count > 0.0 {
                for p in &mut pooled {
                    *p /= token_count;
                }
            }
            normalize(&mut pooled);
            embeddings.push(pooled);
        }

        debug!(batch_size, seq_len, "embedded batch");
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for Embedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Embedder::embed_batch(self, &[text])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedding model returned no vector"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        Embedder::embed_batch(self, texts)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn load_inner(model_dir: &Path) -> anyhow::Result<Embedder> {
    let (model_path, tokenizer_path) = model_files(model_dir)?;
    let encoder = EncoderSession::open(&model_path)?;
    let dim = encoder.output_dim().unwrap_or(384);

    let mut tokenizer = load_tokenizer(&tokenizer_path)?;
    configure_tokenizer(&mut tokenizer, MAX_TOKENS)?;

    info!(dim, model = %model_path.display(), "loaded embedding model");
    Ok(Embedder {
        encoder,
        tokenizer,
        dim,
    })
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
