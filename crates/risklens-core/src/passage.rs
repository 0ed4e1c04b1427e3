//! Indexed passages, their citation metadata, and exact-match metadata filters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Provenance of an indexed passage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassageMetadata {
    pub issuer: String,
    pub fiscal_year: String,
    pub section: String,
    /// Path of the source filing the passage was cut from.
    pub source: String,
}

/// A chunk of a filing with its embedding. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Citation key, e.g. `item_1a.txt:::3`.
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: PassageMetadata,
}

impl Passage {
    pub fn citation(&self) -> Citation {
        Citation {
            chunk_id: self.id.clone(),
            source: self.metadata.source.clone(),
            issuer: self.metadata.issuer.clone(),
            fiscal_year: self.metadata.fiscal_year.clone(),
            section: self.metadata.section.clone(),
        }
    }
}

/// Traceability record attached to retrieval and classification output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub source: String,
    pub issuer: String,
    pub fiscal_year: String,
    pub section: String,
}

/// Metadata fields a filter clause can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Issuer,
    FiscalYear,
    Section,
    Source,
}

impl MetadataField {
    /// Column name in the passage table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issuer => "issuer",
            Self::FiscalYear => "fiscal_year",
            Self::Section => "section",
            Self::Source => "source",
        }
    }

    pub fn value_of<'a>(&self, meta: &'a PassageMetadata) -> &'a str {
        match self {
            Self::Issuer => &meta.issuer,
            Self::FiscalYear => &meta.fiscal_year,
            Self::Section => &meta.section,
            Self::Source => &meta.source,
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issuer" => Ok(Self::Issuer),
            "fiscal_year" | "year" => Ok(Self::FiscalYear),
            "section" => Ok(Self::Section),
            "source" | "path" | "filepath" => Ok(Self::Source),
            other => Err(format!("unknown metadata field {other:?}")),
        }
    }
}

/// Conjunction of exact `field = value` clauses.
///
/// An empty filter matches every passage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    clauses: Vec<(MetadataField, String)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clause. A later clause on the same field replaces the earlier one.
    pub fn with(mut self, field: MetadataField, value: impl Into<String>) -> Self {
        let value = value.into();
        if let Some(existing) = self.clauses.iter_mut().find(|(f, _)| *f == field) {
            existing.1 = value;
        } else {
            self.clauses.push((field, value));
        }
        self
    }

    pub fn issuer(self, value: impl Into<String>) -> Self {
        self.with(MetadataField::Issuer, value)
    }

    pub fn fiscal_year(self, value: impl Into<String>) -> Self {
        self.with(MetadataField::FiscalYear, value)
    }

    pub fn section(self, value: impl Into<String>) -> Self {
        self.with(MetadataField::Section, value)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(MetadataField, String)] {
        &self.clauses
    }

    pub fn matches(&self, meta: &PassageMetadata) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| field.value_of(meta) == value)
    }

    /// Render as a SQL predicate for table scans, or `None` when empty.
    ///
    /// Values are single-quoted with embedded quotes doubled.
    pub fn to_sql(&self) -> Option<String> {
        if self.clauses.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .clauses
            .iter()
            .map(|(field, value)| format!("{} = '{}'", field, value.replace('\'', "''")))
            .collect();
        Some(parts.join(" AND "))
    }
}
