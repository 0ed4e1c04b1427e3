//! Retrieval layer: vector indexes (in-memory, LanceDB) and MMR re-ranking.

mod error;
pub use error::StoreError;

pub mod memory;
pub mod mmr;
pub mod retriever;

pub use memory::MemoryIndex;
pub use mmr::{cosine, mmr_select};
pub use retriever::Retriever;

#[cfg(feature = "lancedb")]
mod lance;
#[cfg(feature = "lancedb")]
pub use lance::LanceIndex;
