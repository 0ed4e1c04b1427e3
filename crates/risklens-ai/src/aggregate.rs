//! Turns raw per-label probabilities into ranked classification results.

use serde::Serialize;

use crate::entailment::LabelScores;

/// One ranked label for a passage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelScore {
    pub label: String,
    /// Normalized taxonomy key, stable across display-name changes.
    pub key: String,
    pub score: f32,
}

/// How to reduce a passage's label scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    /// The `k` best labels.
    TopK(usize),
    /// Every label scoring at least `threshold`, optionally capped.
    Threshold {
        threshold: f32,
        max_labels: Option<usize>,
    },
}

impl Selection {
    pub fn apply(&self, scores: &LabelScores) -> Vec<LabelScore> {
        match *self {
            Self::TopK(k) => top_k(scores, k),
            Self::Threshold {
                threshold,
                max_labels,
            } => above_threshold(scores, threshold, max_labels),
        }
    }
}

/// All labels, sorted descending by score. Ties keep taxonomy order.
pub fn ranked(scores: &LabelScores) -> Vec<LabelScore> {
    let mut out: Vec<LabelScore> = scores
        .iter()
        .map(|(label, score)| LabelScore {
            label: label.name.clone(),
            key: label.key.clone(),
            score,
        })
        .collect();
    // Stable sort: equal scores stay in taxonomy order.
    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    out
}

/// The first `k` labels by descending score; `min(k, |taxonomy|)` entries.
pub fn top_k(scores: &LabelScores, k: usize) -> Vec<LabelScore> {
    let mut out = ranked(scores);
    out.truncate(k);
    out
}

/// Labels with `score >= threshold`, sorted descending, then capped at
/// `max_labels` if given.
pub fn above_threshold(
    scores: &LabelScores,
    threshold: f32,
    max_labels: Option<usize>,
) -> Vec<LabelScore> {
    let mut out: Vec<LabelScore> = ranked(scores)
        .into_iter()
        .filter(|s| s.score >= threshold)
        .collect();
    if let Some(max) = max_labels {
        out.truncate(max);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entailment::{EntailmentScorer, NliModel};
    use risklens_core::LabelTaxonomy;
    use std::sync::Arc;

    /// Returns fixed entailment logits per hypothesis, looked up by label.
    struct FixedNli(Vec<(&'static str, f32)>);

    impl NliModel for FixedNli {
        fn infer(&self, pairs: &[(&str, &str)]) -> anyhow::Result<Vec<[f32; 3]>> {
            Ok(pairs
                .iter()
                .map(|(_, h)| {
                    let logit = self
                        .0
                        .iter()
                        .find(|(label, _)| h.contains(label))
                        .map(|(_, l)| *l)
                        .unwrap_or(-4.0);
                    [0.0, 0.0, logit]
                })
                .collect())
        }
    }

    fn scores(logits: Vec<(&'static str, f32)>) -> LabelScores {
        let scorer =
            EntailmentScorer::new(Arc::new(FixedNli(logits)), LabelTaxonomy::canonical(), 4)
                .unwrap();
        scorer.score(0, "passage").unwrap()
    }

    #[test]
    fn top_k_sorted_descending() {
        let s = scores(vec![("Credit", 2.0), ("Model", 3.0), ("Market", 1.0)]);
        let top = top_k(&s, 3);
        let names: Vec<&str> = top.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(names, ["Model Risk", "Credit Risk", "Market Risk"]);
        assert_eq!(top[0].key, "model_risk");
        assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn top_k_length_is_min_of_k_and_taxonomy() {
        let s = scores(vec![]);
        assert_eq!(top_k(&s, 3).len(), 3);
        assert_eq!(top_k(&s, 10).len(), 10);
        assert_eq!(top_k(&s, 25).len(), 10);
        assert!(top_k(&s, 0).is_empty());
    }

    #[test]
    fn ties_broken_by_taxonomy_order() {
        // Every label gets the default logit, so all scores tie.
        let s = scores(vec![]);
        let names: Vec<String> = top_k(&s, 10).into_iter().map(|l| l.label).collect();
        let expected: Vec<String> = LabelTaxonomy::canonical()
            .names()
            .map(str::to_string)
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn threshold_keeps_exactly_labels_at_or_above() {
        let s = scores(vec![("Cybersecurity", 4.0), ("Operational", 1.0), ("Reputational", 0.5)]);
        let cyber = s.get("Cybersecurity Risk").unwrap();
        let op = s.get("Operational Risk").unwrap();

        let kept = above_threshold(&s, op, None);
        let names: Vec<&str> = kept.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(names, ["Cybersecurity Risk", "Operational Risk"]);
        assert_eq!(kept[0].score, cyber);

        assert!(above_threshold(&s, 1.01, None).is_empty());
    }

    #[test]
    fn threshold_truncates_after_sorting() {
        let s = scores(vec![("Cybersecurity", 4.0), ("Operational", 3.0), ("Market", 2.0)]);
        let kept = above_threshold(&s, 0.0, Some(2));
        let names: Vec<&str> = kept.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(names, ["Cybersecurity Risk", "Operational Risk"]);
    }

    #[test]
    fn lowering_threshold_yields_superset() {
        let s = scores(vec![
            ("Cybersecurity", 4.0),
            ("Operational", 2.5),
            ("Market", 1.0),
            ("Liquidity", -1.0),
        ]);
        let mut previous: Vec<String> = Vec::new();
        for step in (0..=20).rev() {
            let threshold = step as f32 / 20.0;
            let current: Vec<String> = above_threshold(&s, threshold, None)
                .into_iter()
                .map(|l| l.key)
                .collect();
            for key in &previous {
                assert!(current.contains(key), "{key} dropped at threshold {threshold}");
            }
            previous = current;
        }
        assert_eq!(previous.len(), 10, "threshold 0 keeps everything");
    }

    #[test]
    fn selection_dispatches() {
        let s = scores(vec![("Model", 3.0)]);
        assert_eq!(Selection::TopK(2).apply(&s), top_k(&s, 2));
        let sel = Selection::Threshold {
            threshold: 0.5,
            max_labels: None,
        };
        assert_eq!(sel.apply(&s), above_threshold(&s, 0.5, None));
    }
}
