use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("passage file not found: {0}")]
    PassagesNotFound(std::path::PathBuf),

    #[error("{path}:{line}: {source}")]
    Decode {
        path: std::path::PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("embedding dimension mismatch: index holds {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "lancedb")]
    #[error("lancedb error: {0}")]
    Lance(#[from] ::lancedb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}
