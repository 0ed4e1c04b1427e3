use std::path::PathBuf;

use thiserror::Error;

/// The inference model or its tokenizer could not be loaded.
///
/// Raised once, when a scorer or embedder is constructed. The component
/// cannot operate without it.
#[derive(Debug, Error)]
#[error("model unavailable at {path:?}: {reason}")]
pub struct ModelUnavailable {
    pub path: PathBuf,
    pub reason: String,
}

/// One inference batch failed while scoring one passage.
///
/// Remaining batches for that passage are skipped; other passages in the
/// same call are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("inference failed for passage {passage}, label batch {batch}: {reason}")]
pub struct InferenceError {
    /// Position of the passage in the caller's input.
    pub passage: usize,
    /// Zero-based label batch index.
    pub batch: usize,
    pub reason: String,
}

/// Retrieval failed. Retrieval is all-or-nothing: no partial result is
/// returned and nothing is retried.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding query failed: {0}")]
    Embedding(String),

    #[error("vector index search failed: {0}")]
    Index(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxonomyError {
    #[error("label {index} is blank")]
    EmptyLabel { index: usize },

    #[error("labels {first:?} and {second:?} share key {key:?}")]
    DuplicateKey {
        key: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("MMR lambda must be within [0, 1], got {0}")]
    Lambda(f32),

    #[error("label batch size must be at least 1")]
    BatchSize,

    #[error("max token length must be at least 1")]
    MaxLength,

    #[error("{0}")]
    Other(String),
}
