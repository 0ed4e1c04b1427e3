//! Canonical risk label taxonomy.
//!
//! Every passage is scored against the same fixed, ordered list of risk
//! categories. Each label carries a normalized key that is used as a stable
//! external identifier (e.g. for grouping citations) independently of the
//! display string.
//!
//! # Key normalisation
//!
//! - `/` becomes a space: "Regulatory/Legal Risk" → "Regulatory Legal Risk"
//! - spaces become underscores: → "Regulatory_Legal_Risk"
//! - the result is lowercased: → "regulatory_legal_risk"

use serde::Serialize;

use crate::error::TaxonomyError;

/// Reference deployment taxonomy, in scoring order.
pub const CANONICAL_LABELS: &[&str] = &[
    "Market Risk",
    "Liquidity Risk",
    "Credit Risk",
    "Operational Risk",
    "Cybersecurity Risk",
    "Regulatory/Legal Risk",
    "Supply Chain Risk",
    "ESG/Climate Risk",
    "Reputational Risk",
    "Model Risk",
];

/// Normalise a display label into its stable key.
///
/// Input: "ESG/Climate Risk"
/// Output: "esg_climate_risk"
pub fn to_key(label: &str) -> String {
    label.replace('/', " ").replace(' ', "_").to_lowercase()
}

/// A single taxonomy entry: display label plus its normalized key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskLabel {
    pub name: String,
    pub key: String,
}

/// Fixed, ordered set of labels. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelTaxonomy {
    labels: Vec<RiskLabel>,
}

impl LabelTaxonomy {
    /// Build a taxonomy from display labels, preserving order.
    ///
    /// Rejects blank labels and labels whose keys collide, since the key is
    /// the external identifier.
    pub fn new<I, S>(labels: I) -> Result<Self, TaxonomyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<RiskLabel> = Vec::new();
        for label in labels {
            let name: String = label.into();
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(TaxonomyError::EmptyLabel { index: out.len() });
            }
            let key = to_key(&name);
            if let Some(existing) = out.iter().find(|l| l.key == key) {
                return Err(TaxonomyError::DuplicateKey {
                    key,
                    first: existing.name.clone(),
                    second: name,
                });
            }
            out.push(RiskLabel { name, key });
        }
        Ok(Self { labels: out })
    }

    /// The reference taxonomy of 10 risk categories.
    pub fn canonical() -> Self {
        let labels = CANONICAL_LABELS
            .iter()
            .map(|name| RiskLabel {
                name: (*name).to_string(),
                key: to_key(name),
            })
            .collect();
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[RiskLabel] {
        &self.labels
    }

    /// Display names in taxonomy order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|l| l.name.as_str())
    }

    pub fn get(&self, index: usize) -> Option<&RiskLabel> {
        self.labels.get(index)
    }

    /// Position of a label, looked up by display name or by key.
    pub fn position(&self, label: &str) -> Option<usize> {
        let key = to_key(label);
        self.labels.iter().position(|l| l.key == key)
    }
}

impl Default for LabelTaxonomy {
    fn default() -> Self {
        Self::canonical()
    }
}
