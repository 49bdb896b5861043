//! Services
//!
//! Business logic built on the storage layer.

pub mod memory;

pub use memory::{ArtifactStore, Compactor, Graph, Indexer, Searcher, TierManager};
