//! Embeddings from an OpenAI-compatible `/embeddings` endpoint.

use async_trait::async_trait;
use risklens_core::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum HostedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response contained no embedding")]
    Empty,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding provider backed by a hosted API.
pub struct HostedEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
}

impl HostedEmbedder {
    /// Connect to `base_url` (for example `https://api.openai.com/v1`) and
    /// probe the embedding dimension with a one-word request.
    pub async fn connect(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
    ) -> Result<Self, HostedError> {
        let mut embedder = Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            dim: 0,
        };
        embedder.dim = embedder.request(&["dimension probe"]).await?.remove(0).len();
        info!(base_url = %embedder.base_url, model, dim = embedder.dim, "connected to hosted embedding API");
        Ok(embedder)
    }

    /// Embed several texts in one request, in input order.
    pub async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, HostedError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
        };

        debug!(url = %url, count = texts.len(), "requesting embeddings");
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HostedError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let raw = resp.text().await?;
        let vectors = parse_response(&raw)?;
        if vectors.len() != texts.len() {
            return Err(HostedError::Empty);
        }
        Ok(vectors)
    }
}

/// Decode an `/embeddings` response body, ordering vectors by `index`.
fn parse_response(raw: &str) -> Result<Vec<Vec<f32>>, HostedError> {
    let mut resp: EmbeddingResponse = serde_json::from_str(raw)?;
    if resp.data.is_empty() || resp.data.iter().any(|d| d.embedding.is_empty()) {
        return Err(HostedError::Empty);
    }
    resp.data.sort_by_key(|d| d.index);
    Ok(resp.data.into_iter().map(|d| d.embedding).collect())
}

fn check_dims(vectors: &[Vec<f32>], dim: usize) -> anyhow::Result<()> {
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        anyhow::bail!(
            "hosted model returned {} dimensions, expected {dim}",
            bad.len()
        );
    }
    Ok(())
}

#[async_trait]
impl EmbeddingProvider for HostedEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        Ok(vectors.swap_remove(0))
    }

    async fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let vectors = self.request(texts).await?;
        check_dims(&vectors, self.dim)?;
        Ok(vectors)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
