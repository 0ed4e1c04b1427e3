//! Contracts of the external collaborators the retriever depends on.

use async_trait::async_trait;

use crate::passage::{MetadataFilter, Passage};

/// Maps text to a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed several texts, one vector per input in input order.
    ///
    /// The default calls [`embed`](Self::embed) once per text; backends that
    /// accept batches natively override it.
    async fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Length of every vector returned by [`embed`](Self::embed).
    fn dim(&self) -> usize;
}

/// Nearest-neighbour search over stored passage embeddings.
///
/// Implementations return at most `fetch_k` passages ordered by decreasing
/// similarity, every one satisfying `filter` exactly. `None` or an empty
/// filter matches everything.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(
        &self,
        embedding: &[f32],
        fetch_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> anyhow::Result<Vec<Passage>>;
}
