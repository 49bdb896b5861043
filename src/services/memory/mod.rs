//! Artifact Memory Engine
//!
//! Persistent memory for agent artifacts (documents, evidence events, drift
//! reports) with lexical, semantic and relational retrieval.
//!
//! ## Module Structure
//!
//! - `store` - `ArtifactStore` CRUD with the FTS5 shadow index
//! - `frontmatter` - document metadata parsing
//! - `indexer` - incremental directory indexing
//! - `graph` - feature/workstream relationship queries
//! - `search` - fts, semantic, graph and hybrid search
//! - `tiering` - age-based tiers and compaction triggers
//! - `compaction` - event summarisation
//! - `adapters` - evidence/drift record import

pub mod adapters;
pub mod compaction;
pub mod frontmatter;
pub mod graph;
pub mod indexer;
pub mod search;
pub mod store;
pub mod tiering;

pub use adapters::{import_records, ImportStats, IntoArtifact};
pub use compaction::{CompactionOutcome, Compactor};
pub use frontmatter::{parse_document, DocumentMetadata, ParsedDocument};
pub use graph::{FeatureGroup, Graph};
pub use indexer::{IndexStats, Indexer};
pub use search::{
    cosine_similarity, SearchMode, SearchOptions, SearchResponse, SearchResult, Searcher,
};
pub use store::ArtifactStore;
pub use tiering::{Tier, TierManager, TierPolicy, TierStats};
