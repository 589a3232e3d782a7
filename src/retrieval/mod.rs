//! Memory and fact retrieval feeding the context assembler
//!
//! - Source traits with an explicit degrade-to-empty policy
//! - Merging and deduplication into one canonical candidate pool
//! - Qdrant-backed semantic memory adapter with an embedding client

pub mod embedding;
pub mod qdrant_memory;
pub mod ranker;
pub mod sources;

pub use embedding::{Embedder, EmbeddingConfig, HttpEmbedder};
pub use qdrant_memory::{MemoryStoreConfig, QdrantMemorySource};
pub use ranker::RetrievalRanker;
pub use sources::{
    fetch_or_empty, FactSource, RetrievalError, ScoredSnippet, SemanticMemorySource,
};
