//! Zero-shot entailment scoring of a passage against every taxonomy label.
//!
//! For each label the passage is the NLI premise and the hypothesis is
//! `"This text is about <label>."`. Labels are scored in fixed-size batches so
//! that memory per inference call depends on the batch size, not on the size
//! of the taxonomy: a taxonomy of `L` labels with batch size `B` costs
//! `ceil(L / B)` calls per passage.

use std::sync::Arc;

use risklens_core::{ConfigError, InferenceError, LabelTaxonomy, RiskLabel};
use tracing::debug;

/// An NLI model that scores (premise, hypothesis) pairs.
///
/// Implementations must be deterministic for fixed weights and inputs and
/// must not truncate the hypothesis.
pub trait NliModel: Send + Sync {
    /// Return one `[contradiction, neutral, entailment]` logit triple per
    /// pair, in input order.
    fn infer(&self, pairs: &[(&str, &str)]) -> anyhow::Result<Vec<[f32; 3]>>;
}

/// Hypothesis sentence for a label.
pub fn hypothesis(label: &str) -> String {
    format!("This text is about {label}.")
}

/// Softmax over the three NLI classes, returning the entailment component.
///
/// `None` if any logit is NaN or infinite.
pub fn entailment_probability(logits: [f32; 3]) -> Option<f32> {
    if logits.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = logits.map(|x| (x - max).exp());
    let sum: f32 = exps.iter().sum();
    Some((exps[2] / sum).clamp(0.0, 1.0))
}

/// Entailment probability for every label of a taxonomy, for one passage.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScores {
    taxonomy: Arc<LabelTaxonomy>,
    scores: Vec<f32>,
}

impl LabelScores {
    /// Probability for a label, looked up by display name or key.
    pub fn get(&self, label: &str) -> Option<f32> {
        self.taxonomy.position(label).map(|i| self.scores[i])
    }

    /// `(label, probability)` in taxonomy order.
    pub fn iter(&self) -> impl Iterator<Item = (&RiskLabel, f32)> {
        self.taxonomy.labels().iter().zip(self.scores.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Batched zero-shot scorer over a fixed taxonomy.
#[derive(Clone)]
pub struct EntailmentScorer {
    model: Arc<dyn NliModel>,
    taxonomy: Arc<LabelTaxonomy>,
    hypotheses: Vec<String>,
    batch_size: usize,
}

impl EntailmentScorer {
    pub fn new(
        model: Arc<dyn NliModel>,
        taxonomy: LabelTaxonomy,
        batch_size: usize,
    ) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        let hypotheses = taxonomy.names().map(hypothesis).collect();
        Ok(Self {
            model,
            taxonomy: Arc::new(taxonomy),
            hypotheses,
            batch_size,
        })
    }

    pub fn taxonomy(&self) -> &LabelTaxonomy {
        &self.taxonomy
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Inference calls issued per passage.
    pub fn calls_per_passage(&self) -> usize {
        self.taxonomy.len().div_ceil(self.batch_size)
    }

    /// Score every label for one passage.
    ///
    /// `passage` is the caller's index for the text and is only used to give
    /// errors context. The first failing batch aborts the passage.
    pub fn score(&self, passage: usize, text: &str) -> Result<LabelScores, InferenceError> {
        let mut scores = vec![0.0f32; self.taxonomy.len()];

        for (batch, hypotheses) in self.hypotheses.chunks(self.batch_size).enumerate() {
            let start = batch * self.batch_size;
            let fail = |reason: String| InferenceError {
                passage,
                batch,
                reason,
            };

            let pairs: Vec<(&str, &str)> = hypotheses.iter().map(|h| (text, h.as_str())).collect();
            let logits = self
                .model
                .infer(&pairs)
                .map_err(|e| fail(format!("{e:#}")))?;

            if logits.len() != pairs.len() {
                return Err(fail(format!(
                    "model returned {} outputs for {} pairs",
                    logits.len(),
                    pairs.len()
                )));
            }

            for (offset, row) in logits.into_iter().enumerate() {
                let idx = start + offset;
                scores[idx] = entailment_probability(row).ok_or_else(|| {
                    fail(format!(
                        "non-finite logits {row:?} for label {:?}",
                        self.hypotheses[idx]
                    ))
                })?;
            }

            debug!(passage, batch, labels = pairs.len(), "scored label batch");
        }

        Ok(LabelScores {
            taxonomy: Arc::clone(&self.taxonomy),
            scores,
        })
    }
}
