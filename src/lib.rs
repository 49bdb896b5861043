//! Cascade Memory - Artifact Memory and Search Engine
//!
//! Persistent memory for Plan Cascade agents. It includes:
//! - Storage layer (SQLite with WAL, schema migrations, JSON config)
//! - Artifact store with an FTS5 shadow index
//! - Incremental document indexer
//! - Full-text, semantic, graph and hybrid search
//! - Embedding quantization, age tiering and event compaction
//! - Data models and utilities
//!
//! Embeddings come from an injected [`EmbeddingProvider`]; the engine never
//! generates them itself.

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use cascade_memory_core::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
pub use models::artifact::Artifact;
pub use models::records::{DriftReport, EventSummary, EvidenceEvent};
pub use services::memory::{
    ArtifactStore, Compactor, Graph, IndexStats, Indexer, SearchMode, SearchOptions,
    SearchResponse, Searcher, TierManager, TierPolicy,
};
pub use storage::config::{MemoryConfig, SearchConfig};
pub use storage::database::Database;
pub use utils::error::{AppError, AppResult};
