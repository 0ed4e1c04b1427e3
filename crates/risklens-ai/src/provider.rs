//! Builds the configured embedding provider.

use std::sync::Arc;

use risklens_core::{EmbeddingBackend, EmbeddingConfig, EmbeddingProvider};

/// Construct the embedding provider named by `config`.
///
/// Fails if the backend's cargo feature was not compiled in.
pub async fn embedding_provider(
    config: &EmbeddingConfig,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match &config.backend {
        EmbeddingBackend::Onnx { model_dir } => onnx(model_dir),
        EmbeddingBackend::Hosted {
            base_url,
            model,
            api_key,
        } => hosted(base_url, model, api_key.clone()).await,
    }
}

#[cfg(feature = "onnx")]
fn onnx(model_dir: &std::path::Path) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(crate::embedder::Embedder::load(model_dir)?))
}

#[cfg(not(feature = "onnx"))]
fn onnx(_model_dir: &std::path::Path) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    anyhow::bail!("ONNX embedding backend requires the `onnx` feature")
}

#[cfg(feature = "hosted")]
async fn hosted(
    base_url: &str,
    model: &str,
    api_key: Option<String>,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(
        crate::hosted::HostedEmbedder::connect(base_url, model, api_key).await?,
    ))
}

#[cfg(not(feature = "hosted"))]
async fn hosted(
    _base_url: &str,
    _model: &str,
    _api_key: Option<String>,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    anyhow::bail!("hosted embedding backend requires the `hosted` feature")
}
