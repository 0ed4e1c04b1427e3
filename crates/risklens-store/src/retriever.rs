//! Query-time retrieval: embed the query, over-fetch candidates from the
//! vector index, and re-rank them with MMR.

use std::collections::HashSet;
use std::sync::Arc;

use risklens_core::{
    ConfigError, EmbeddingProvider, MetadataFilter, Passage, RetrievalConfig, RetrievalError,
    VectorIndex,
};
use tracing::debug;

use crate::mmr::mmr_select;

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            embedder,
            index,
            config,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Up to `k` passages relevant to `query` and diverse among themselves.
    ///
    /// Every returned passage satisfies `filter` and appears once. An
    /// embedding or index failure fails the whole call.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Passage>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RetrievalError::Embedding(format!("{e:#}")))?;

        let fetch_k = self.config.fetch_k_for(k);
        let raw = self
            .index
            .search(&embedding, fetch_k, filter)
            .await
            .map_err(|e| RetrievalError::Index(format!("{e:#}")))?;
        let fetched = raw.len();

        let mut seen = HashSet::new();
        let candidates: Vec<Passage> = raw
            .into_iter()
            .filter(|p| filter.is_none_or(|f| f.matches(&p.metadata)))
            .filter(|p| seen.insert(p.id.clone()))
            .take(fetch_k)
            .collect();

        let vectors: Vec<&[f32]> = candidates.iter().map(|p| p.embedding.as_slice()).collect();
        let order = mmr_select(&embedding, &vectors, k, self.config.lambda);

        debug!(
            k,
            fetch_k,
            fetched,
            candidates = candidates.len(),
            selected = order.len(),
            lambda = self.config.lambda,
            "mmr retrieval"
        );

        let mut slots: Vec<Option<Passage>> = candidates.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryIndex;
    use crate::memory::tests::passage;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds every query to the same vector and counts calls.
    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(vector: &[f32]) -> Arc<Self> {
            Arc::new(Self {
                vector: vector.to_vec(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }

        fn dim(&self) -> usize {
            self.vector.len()
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }

        fn dim(&self) -> usize {
            2
        }
    }

    /// Ignores the filter, repeats results, and records the requested pool size.
    struct SloppyIndex {
        passages: Vec<Passage>,
        requested: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl VectorIndex for SloppyIndex {
        async fn search(
            &self,
            _embedding: &[f32],
            fetch_k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> anyhow::Result<Vec<Passage>> {
            self.requested.lock().unwrap().push(fetch_k);
            let mut out = self.passages.clone();
            out.extend(self.passages.iter().cloned());
            Ok(out)
        }
    }

    struct DownIndex;

    #[async_trait]
    impl VectorIndex for DownIndex {
        async fn search(
            &self,
            _embedding: &[f32],
            _fetch_k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> anyhow::Result<Vec<Passage>> {
            anyhow::bail!("table passages not found")
        }
    }

    fn corpus() -> Vec<Passage> {
        vec![
            passage("acme:::0", "ACME", "2024", &[1.0, 0.0]),
            passage("acme:::1", "ACME", "2024", &[1.0, 0.01]),
            passage("acme:::2", "ACME", "2023", &[0.7, 0.7]),
            passage("globex:::0", "GLOBEX", "2024", &[0.99, 0.1]),
            passage("globex:::1", "GLOBEX", "2024", &[0.0, 1.0]),
        ]
    }

    fn retriever(lambda: f32) -> Retriever {
        let index = MemoryIndex::new(corpus()).unwrap();
        Retriever::new(
            FixedEmbedder::new(&[1.0, 0.0]),
            Arc::new(index),
            RetrievalConfig {
                lambda,
                fetch_k: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn filter_restricts_to_matching_issuer() {
        let r = retriever(0.5);
        let filter = MetadataFilter::new().issuer("ACME");
        let hits = r.retrieve("supply disruption", 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|p| p.metadata.issuer == "ACME"));
    }

    #[tokio::test]
    async fn no_match_is_empty_not_error() {
        let r = retriever(0.5);
        let filter = MetadataFilter::new().issuer("INITECH");
        let hits = r.retrieve("anything", 5, Some(&filter)).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn k_zero_skips_embedding() {
        let embedder = FixedEmbedder::new(&[1.0, 0.0]);
        let r = Retriever::new(
            embedder.clone(),
            Arc::new(MemoryIndex::new(corpus()).unwrap()),
            RetrievalConfig::default(),
        )
        .unwrap();
        assert!(r.retrieve("q", 0, None).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lambda_one_returns_nearest_first() {
        let r = retriever(1.0);
        let hits = r.retrieve("q", 3, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["acme:::0", "acme:::1", "globex:::0"]);
    }

    #[tokio::test]
    async fn low_lambda_skips_near_duplicate() {
        let r = retriever(0.3);
        let hits = r.retrieve("q", 2, None).await.unwrap();
        assert_eq!(hits[0].id, "acme:::0");
        assert_ne!(hits[1].id, "acme:::1");
    }

    #[tokio::test]
    async fn rechecks_filter_and_dedupes_index_output() {
        let index = Arc::new(SloppyIndex {
            passages: corpus(),
            requested: Mutex::new(Vec::new()),
        });
        let r = Retriever::new(
            FixedEmbedder::new(&[1.0, 0.0]),
            index.clone(),
            RetrievalConfig::default(),
        )
        .unwrap();
        let filter = MetadataFilter::new().fiscal_year("2024");
        let hits = r.retrieve("q", 10, Some(&filter)).await.unwrap();

        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(|p| p.metadata.fiscal_year == "2024"));
        let ids: HashSet<&str> = hits.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), hits.len());
        assert_eq!(*index.requested.lock().unwrap(), vec![20]);
    }

    #[tokio::test]
    async fn fetch_k_never_below_k() {
        let index = Arc::new(SloppyIndex {
            passages: corpus(),
            requested: Mutex::new(Vec::new()),
        });
        let r = Retriever::new(
            FixedEmbedder::new(&[1.0, 0.0]),
            index.clone(),
            RetrievalConfig {
                lambda: 0.5,
                fetch_k: Some(2),
            },
        )
        .unwrap();
        let hits = r.retrieve("q", 4, None).await.unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(*index.requested.lock().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn embedding_failure_is_retrieval_error() {
        let r = Retriever::new(
            Arc::new(DownEmbedder),
            Arc::new(MemoryIndex::new(corpus()).unwrap()),
            RetrievalConfig::default(),
        )
        .unwrap();
        let err = r.retrieve("q", 3, None).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(ref m) if m.contains("connection refused")));
    }

    #[tokio::test]
    async fn index_failure_is_retrieval_error() {
        let r = Retriever::new(
            FixedEmbedder::new(&[1.0, 0.0]),
            Arc::new(DownIndex),
            RetrievalConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            r.retrieve("q", 3, None).await,
            Err(RetrievalError::Index(_))
        ));
    }

    #[test]
    fn lambda_out_of_range_rejected() {
        let result = Retriever::new(
            FixedEmbedder::new(&[1.0]),
            Arc::new(DownIndex),
            RetrievalConfig {
                lambda: 1.5,
                fetch_k: None,
            },
        );
        assert!(matches!(result, Err(ConfigError::Lambda(_))));
    }
}
