//! Shared types for risklens: passages, metadata filters, the risk label
//! taxonomy, configuration, error kinds, and the contracts of the external
//! collaborators (embedding provider and vector index).

pub mod config;
pub mod error;
pub mod passage;
pub mod provider;
pub mod schema;
pub mod taxonomy;

pub use config::{EmbeddingBackend, EmbeddingConfig, RetrievalConfig, ScorerConfig, Settings};
pub use error::{ConfigError, InferenceError, ModelUnavailable, RetrievalError, TaxonomyError};
pub use passage::{Citation, MetadataField, MetadataFilter, Passage, PassageMetadata};
pub use provider::{EmbeddingProvider, VectorIndex};
pub use schema::passages;
pub use taxonomy::{LabelTaxonomy, RiskLabel, to_key};
