//! Exact in-memory vector index.
//!
//! Brute-force cosine search over a fixed set of passages. Suitable for
//! small corpora and for tests; large corpora belong in LanceDB.

use std::io::{BufRead, BufReader};
use std::path::Path;

use async_trait::async_trait;
use risklens_core::{MetadataFilter, Passage, VectorIndex};
use tracing::{debug, info};

use crate::StoreError;
use crate::mmr::cosine;

pub struct MemoryIndex {
    passages: Vec<Passage>,
    dim: usize,
}

impl MemoryIndex {
    /// Build an index. Every passage must have the same embedding width.
    pub fn new(passages: Vec<Passage>) -> Result<Self, StoreError> {
        let dim = passages.first().map_or(0, |p| p.embedding.len());
        if let Some(bad) = passages.iter().find(|p| p.embedding.len() != dim) {
            return Err(StoreError::Dimension {
                expected: dim,
                actual: bad.embedding.len(),
            });
        }
        Ok(Self { passages, dim })
    }

    /// Load passages from a JSON-lines file, one serialized [`Passage`] per
    /// line. Blank lines are skipped.
    pub fn from_jsonl(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::PassagesNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut passages = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let passage: Passage =
                serde_json::from_str(&line).map_err(|source| StoreError::Decode {
                    path: path.to_path_buf(),
                    line: i + 1,
                    source,
                })?;
            passages.push(passage);
        }
        let index = Self::new(passages)?;
        info!(path = %path.display(), passages = index.len(), dim = index.dim, "loaded passage index");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Embedding width, or 0 for an empty index.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn search(
        &self,
        embedding: &[f32],
        fetch_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> anyhow::Result<Vec<Passage>> {
        if !self.passages.is_empty() && embedding.len() != self.dim {
            return Err(StoreError::Dimension {
                expected: self.dim,
                actual: embedding.len(),
            }
            .into());
        }

        let mut hits: Vec<(f32, &Passage)> = self
            .passages
            .iter()
            .filter(|p| filter.is_none_or(|f| f.matches(&p.metadata)))
            .map(|p| (cosine(embedding, &p.embedding), p))
            .collect();
        hits.sort_by(|a, b| b.0.total_cmp(&a.0));
        hits.truncate(fetch_k);

        debug!(fetch_k, hits = hits.len(), "memory index search");
        Ok(hits.into_iter().map(|(_, p)| p.clone()).collect())
    }
}
