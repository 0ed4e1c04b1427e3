//! Runtime settings shared by the scorer, retriever and embedding backends.
//!
//! Plain data with defaults; the binary fills these from flags and
//! environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Zero-shot scorer knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Directory containing `model.onnx` and `tokenizer.json` of an MNLI model.
    pub model_dir: PathBuf,
    /// Labels scored per inference call.
    pub batch_size: usize,
    /// Maximum tokens per (premise, hypothesis) pair.
    pub max_length: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models/bart-large-mnli"),
            batch_size: 16,
            max_length: 512,
        }
    }
}

/// MMR retrieval knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Relevance/diversity trade-off: 1.0 is pure relevance, 0.0 pure diversity.
    pub lambda: f32,
    /// Candidate pool size. `None` uses `max(20, 2k)`.
    pub fetch_k: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lambda: 0.5,
            fetch_k: None,
        }
    }
}

impl RetrievalConfig {
    /// Candidate pool size for a request of `k` results. Never below `k`.
    pub fn fetch_k_for(&self, k: usize) -> usize {
        self.fetch_k.unwrap_or_else(|| (2 * k).max(20)).max(k)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(ConfigError::Lambda(self.lambda));
        }
        Ok(())
    }
}

/// Which embedding provider to construct. Chosen once, at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Local sentence-transformers model run through ONNX Runtime.
    Onnx { model_dir: PathBuf },
    /// OpenAI-compatible `/embeddings` endpoint.
    Hosted {
        base_url: String,
        model: String,
        #[serde(default, skip_serializing)]
        api_key: Option<String>,
    },
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        Self::Onnx {
            model_dir: PathBuf::from("models/all-MiniLM-L6-v2"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
}

/// All settings for one process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scorer: ScorerConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scorer.batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        if self.scorer.max_length == 0 {
            return Err(ConfigError::MaxLength);
        }
        if let EmbeddingBackend::Hosted { base_url, .. } = &self.embedding.backend
            && base_url.trim().is_empty()
        {
            return Err(ConfigError::Other("hosted embedding base_url is empty".into()));
        }
        self.retrieval.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.scorer.batch_size, 16);
        assert_eq!(s.scorer.max_length, 512);
    }

    #[test]
    fn fetch_k_default_and_floor() {
        let cfg = RetrievalConfig::default();
        assert_eq!(cfg.fetch_k_for(5), 20);
        assert_eq!(cfg.fetch_k_for(12), 24);

        let small = RetrievalConfig {
            fetch_k: Some(3),
            ..Default::default()
        };
        assert_eq!(small.fetch_k_for(8), 8, "fetch_k never drops below k");
    }

    #[test]
    fn lambda_out_of_range_rejected() {
        let mut s = Settings::default();
        s.retrieval.lambda = 1.5;
        assert_eq!(s.validate(), Err(ConfigError::Lambda(1.5)));
        s.retrieval.lambda = f32::NAN;
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_batch_rejected() {
        let mut s = Settings::default();
        s.scorer.batch_size = 0;
        assert_eq!(s.validate(), Err(ConfigError::BatchSize));
    }

    #[test]
    fn backend_deserializes_from_tagged_json() {
        let json = r#"{"embedding":{"backend":{"kind":"hosted","base_url":"http://localhost:8080/v1","model":"text-embedding-3-small"}}}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        match s.embedding.backend {
            EmbeddingBackend::Hosted { base_url, model, api_key } => {
                assert_eq!(base_url, "http://localhost:8080/v1");
                assert_eq!(model, "text-embedding-3-small");
                assert!(api_key.is_none());
            }
            other => panic!("unexpected backend {other:?}"),
        }
        assert_eq!(s.scorer, ScorerConfig::default());
    }
}
