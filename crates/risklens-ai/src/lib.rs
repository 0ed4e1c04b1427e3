//! Inference layer: zero-shot NLI risk classification and embedding
//! providers (ONNX Runtime locally, or a hosted API).

pub mod aggregate;
pub mod cache;
pub mod classifier;
pub mod entailment;
mod provider;

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "hosted")]
mod hosted;
#[cfg(feature = "onnx")]
mod nli;
#[cfg(feature = "onnx")]
mod onnx;

pub use aggregate::{LabelScore, Selection, above_threshold, top_k};
pub use classifier::{Classification, RiskClassifier};
pub use entailment::{EntailmentScorer, LabelScores, NliModel, entailment_probability, hypothesis};
pub use provider::embedding_provider;

#[cfg(feature = "onnx")]
pub use embedder::Embedder;
#[cfg(feature = "hosted")]
pub use hosted::{HostedEmbedder, HostedError};
#[cfg(feature = "onnx")]
pub use nli::OnnxNli;
