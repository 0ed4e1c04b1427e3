//! Zero-shot risk classifier over a fixed label taxonomy.
//!
//! Scores each passage against every taxonomy label with an NLI model, then
//! reduces the scores to either the top-k labels or all labels above a
//! threshold. Passages are independent: they are scored in parallel and a
//! failure in one passage never affects the others.

use std::sync::Arc;

use rayon::prelude::*;
use risklens_core::{ConfigError, InferenceError, LabelTaxonomy, ScorerConfig};
use tracing::{debug, warn};

use crate::aggregate::{LabelScore, Selection};
use crate::entailment::{EntailmentScorer, LabelScores, NliModel};

/// Per-passage classification outcome, in input order.
pub type Classification = Result<Vec<LabelScore>, InferenceError>;

/// Zero-shot risk classifier.
///
/// Cloning is cheap: clones share the loaded model.
#[derive(Clone)]
pub struct RiskClassifier {
    scorer: EntailmentScorer,
}

impl RiskClassifier {
    pub fn new(scorer: EntailmentScorer) -> Self {
        Self { scorer }
    }

    /// Build a classifier around an already-loaded NLI model.
    pub fn with_model(
        model: Arc<dyn NliModel>,
        taxonomy: LabelTaxonomy,
        config: &ScorerConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(EntailmentScorer::new(
            model,
            taxonomy,
            config.batch_size,
        )?))
    }

    /// Build a classifier over the ONNX model in `config.model_dir`.
    ///
    /// The model is loaded once per process and shared by every classifier
    /// built from the same directory and max length.
    #[cfg(feature = "onnx")]
    pub fn load(
        config: &ScorerConfig,
        taxonomy: LabelTaxonomy,
    ) -> anyhow::Result<Self> {
        let model = crate::nli::OnnxNli::shared(&config.model_dir, config.max_length)?;
        Ok(Self::with_model(model, taxonomy, config)?)
    }

    pub fn taxonomy(&self) -> &LabelTaxonomy {
        self.scorer.taxonomy()
    }

    pub fn scorer(&self) -> &EntailmentScorer {
        &self.scorer
    }

    /// Raw per-label probabilities for each text.
    pub fn score<S: AsRef<str> + Sync>(
        &self,
        texts: &[S],
    ) -> Vec<Result<LabelScores, InferenceError>> {
        debug!(
            passages = texts.len(),
            calls_per_passage = self.scorer.calls_per_passage(),
            "scoring passages"
        );
        texts
            .par_iter()
            .enumerate()
            .map(|(i, text)| {
                let result = self.scorer.score(i, text.as_ref());
                if let Err(e) = &result {
                    warn!(passage = e.passage, batch = e.batch, reason = %e.reason, "passage inference failed");
                }
                result
            })
            .collect()
    }

    /// Reduce each text's scores with `selection`.
    pub fn classify_with<S: AsRef<str> + Sync>(
        &self,
        texts: &[S],
        selection: Selection,
    ) -> Vec<Classification> {
        self.score(texts)
            .into_iter()
            .map(|scores| scores.map(|s| selection.apply(&s)))
            .collect()
    }

    /// The `top_k` best labels per text, sorted descending.
    pub fn classify<S: AsRef<str> + Sync>(&self, texts: &[S], top_k: usize) -> Vec<Classification> {
        self.classify_with(texts, Selection::TopK(top_k))
    }

    /// Every label scoring at least `threshold` per text, sorted descending
    /// and optionally capped at `max_labels`.
    pub fn classify_threshold<S: AsRef<str> + Sync>(
        &self,
        texts: &[S],
        threshold: f32,
        max_labels: Option<usize>,
    ) -> Vec<Classification> {
        self.classify_with(
            texts,
            Selection::Threshold {
                threshold,
                max_labels,
            },
        )
    }
}
