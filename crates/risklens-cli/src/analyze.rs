//! Retrieve passages for a query, classify them, and group citations by risk.

use std::collections::BTreeMap;

use risklens_ai::{LabelScore, RiskClassifier, Selection};
use risklens_core::{Citation, MetadataFilter, Passage, RetrievalError};
use risklens_store::Retriever;
use serde::Serialize;
use tracing::{info, warn};

/// Passages classified per report, matching the dashboard's tagged-chunk list.
pub const DEFAULT_CLASSIFY_LIMIT: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassageAnalysis {
    pub citation: Citation,
    pub text: String,
    /// Selected labels, empty if inference failed.
    pub labels: Vec<LabelScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReport {
    pub query: String,
    pub passages: Vec<PassageAnalysis>,
    /// Label key to the chunk ids tagged with it, in retrieval order.
    pub by_label: BTreeMap<String, Vec<String>>,
}

pub struct AnalyzeRequest<'a> {
    pub query: &'a str,
    pub k: usize,
    pub filter: Option<&'a MetadataFilter>,
    pub selection: Selection,
    pub classify_limit: usize,
}

pub async fn analyze(
    retriever: &Retriever,
    classifier: &RiskClassifier,
    req: AnalyzeRequest<'_>,
) -> Result<RiskReport, RetrievalError> {
    let mut passages = retriever.retrieve(req.query, req.k, req.filter).await?;
    passages.truncate(req.classify_limit);

    let results = classify_blocking(classifier, &passages, req.selection).await;

    let mut by_label: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let analyses: Vec<PassageAnalysis> = passages
        .iter()
        .zip(results)
        .map(|(passage, result)| {
            let (labels, error) = match result {
                Ok(labels) => (labels, None),
                Err(e) => (Vec::new(), Some(e)),
            };
            for label in &labels {
                by_label
                    .entry(label.key.clone())
                    .or_default()
                    .push(passage.id.clone());
            }
            PassageAnalysis {
                citation: passage.citation(),
                text: passage.text.clone(),
                labels,
                error,
            }
        })
        .collect();

    info!(
        query = req.query,
        passages = analyses.len(),
        labels = by_label.len(),
        "analysis complete"
    );
    Ok(RiskReport {
        query: req.query.to_string(),
        passages: analyses,
        by_label,
    })
}

/// Classify on the blocking pool so the rayon fan-out never stalls the
/// async runtime.
async fn classify_blocking(
    classifier: &RiskClassifier,
    passages: &[Passage],
    selection: Selection,
) -> Vec<Result<Vec<LabelScore>, String>> {
    let classifier = classifier.clone();
    let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
    let count = texts.len();

    match tokio::task::spawn_blocking(move || classifier.classify_with(&texts[..], selection)).await {
        Ok(results) => results
            .into_iter()
            .map(|r| r.map_err(|e| e.to_string()))
            .collect(),
        Err(e) => {
            warn!(error = %e, "classification task failed");
            vec![Err(format!("classification task failed: {e}")); count]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use risklens_ai::NliModel;
    use risklens_core::{
        EmbeddingProvider, LabelTaxonomy, PassageMetadata, RetrievalConfig, ScorerConfig,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};
    use risklens_store::MemoryIndex;
    use std::sync::Arc;

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn dim(&self) -> usize {
            2
        }
    }

    /// Entails a label when the premise names its first word; fails on "garbled".
    struct FirstWordNli;

    impl NliModel for FirstWordNli {
        fn infer(&self, pairs: &[(&str, &str)]) -> anyhow::Result<Vec<[f32; 3]>> {
            pairs
                .iter()
                .map(|(premise, hypothesis)| {
                    anyhow::ensure!(!premise.contains("garbled"), "tokenizer rejected input");
                    let label = hypothesis.trim_start_matches("This text is about ");
                    let word = label.split([' ', '/']).next().unwrap_or_default().to_lowercase();
                    let hit = premise.to_lowercase().contains(&word);
                    Ok([0.0, 0.0, if hit { 5.0 } else { -5.0 }])
                })
                .collect()
        }
    }

    fn passage(id: &str, issuer: &str, text: &str, embedding: [f32; 2]) -> Passage {
        Passage {
            id: id.into(),
            text: text.into(),
            embedding: embedding.to_vec(),
            metadata: PassageMetadata {
                issuer: issuer.into(),
                fiscal_year: "2024".into(),
                section: "Item 1A".into(),
                source: format!("data/samples/{issuer}/2024/item_1a.txt"),
            },
        }
    }

    /// Blocks each call until `open` is set, failing after two seconds.
    struct GatedNli {
        open: Arc<AtomicBool>,
    }

    impl NliModel for GatedNli {
        fn infer(&self, pairs: &[(&str, &str)]) -> anyhow::Result<Vec<[f32; 3]>> {
            let deadline = Instant::now() + Duration::from_secs(2);
            while !self.open.load(Ordering::SeqCst) {
                anyhow::ensure!(Instant::now() < deadline, "gate never opened");
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(vec![[0.0, 0.0, 5.0]; pairs.len()])
        }
    }

    fn fixtures() -> (Retriever, RiskClassifier) {
        let index = MemoryIndex::new(vec![
            passage("acme:::0", "ACME", "Cybersecurity incidents could disrupt operations.", [1.0, 0.0]),
            passage("acme:::1", "ACME", "Credit losses and market volatility may rise.", [0.8, 0.6]),
            passage("acme:::2", "ACME", "garbled \u{fffd}\u{fffd} text", [0.6, 0.8]),
            passage("globex:::0", "GLOBEX", "Liquidity could tighten.", [1.0, 0.1]),
        ])
        .unwrap();
        let retriever = Retriever::new(
            Arc::new(UnitEmbedder),
            Arc::new(index),
            RetrievalConfig::default(),
        )
        .unwrap();
        let classifier = RiskClassifier::with_model(
            Arc::new(FirstWordNli),
            LabelTaxonomy::canonical(),
            &ScorerConfig::default(),
        )
        .unwrap();
        (retriever, classifier)
    }

    fn request<'a>(filter: Option<&'a MetadataFilter>, classify_limit: usize) -> AnalyzeRequest<'a> {
        AnalyzeRequest {
            query: "what are the main risks",
            k: 12,
            filter,
            selection: Selection::Threshold {
                threshold: 0.5,
                max_labels: None,
            },
            classify_limit,
        }
    }

    #[tokio::test]
    async fn groups_citations_by_label() {
        let (retriever, classifier) = fixtures();
        let filter = MetadataFilter::new().issuer("ACME");
        let report = analyze(&retriever, &classifier, request(Some(&filter), DEFAULT_CLASSIFY_LIMIT))
            .await
            .unwrap();

        assert_eq!(report.passages.len(), 3);
        assert!(report.passages.iter().all(|p| p.citation.issuer == "ACME"));
        assert_eq!(report.by_label["cybersecurity_risk"], vec!["acme:::0"]);
        assert_eq!(report.by_label["credit_risk"], vec!["acme:::1"]);
        assert_eq!(report.by_label["market_risk"], vec!["acme:::1"]);
        assert!(!report.by_label.contains_key("liquidity_risk"));
    }

    #[tokio::test]
    async fn inference_failure_stays_in_its_entry() {
        let (retriever, classifier) = fixtures();
        let filter = MetadataFilter::new().issuer("ACME");
        let report = analyze(&retriever, &classifier, request(Some(&filter), DEFAULT_CLASSIFY_LIMIT))
            .await
            .unwrap();

        let failed: Vec<&PassageAnalysis> =
            report.passages.iter().filter(|p| p.error.is_some()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].citation.chunk_id, "acme:::2");
        assert!(failed[0].labels.is_empty());
        assert!(report.passages.iter().filter(|p| p.error.is_none()).all(|p| !p.labels.is_empty()));
    }

    #[tokio::test]
    async fn classify_limit_truncates() {
        let (retriever, classifier) = fixtures();
        let report = analyze(&retriever, &classifier, request(None, 2)).await.unwrap();
        assert_eq!(report.passages.len(), 2);
    }

    #[tokio::test]
    async fn classification_leaves_runtime_free() {
        let (retriever, _) = fixtures();
        let open = Arc::new(AtomicBool::new(false));
        let classifier = RiskClassifier::with_model(
            Arc::new(GatedNli { open: open.clone() }),
            LabelTaxonomy::canonical(),
            &ScorerConfig::default(),
        )
        .unwrap();

        // Runs on this single-threaded runtime only once `analyze` yields.
        let opener = tokio::spawn({
            let open = open.clone();
            async move { open.store(true, Ordering::SeqCst) }
        });

        let report = analyze(&retriever, &classifier, request(None, 2)).await.unwrap();
        opener.await.unwrap();
        assert_eq!(report.passages.len(), 2);
        assert!(report.passages.iter().all(|p| p.error.is_none()), "{report:?}");
    }

    #[tokio::test]
    async fn no_match_gives_empty_report() {
        let (retriever, classifier) = fixtures();
        let filter = MetadataFilter::new().issuer("INITECH");
        let report = analyze(&retriever, &classifier, request(Some(&filter), DEFAULT_CLASSIFY_LIMIT))
            .await
            .unwrap();
        assert!(report.passages.is_empty());
        assert!(report.by_label.is_empty());
        assert_eq!(report.query, "what are the main risks");
    }
}
