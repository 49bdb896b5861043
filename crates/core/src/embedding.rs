//! Embedding Provider Abstraction
//!
//! Defines the async `EmbeddingProvider` trait used by the searcher and the
//! indexer. Vector generation is always external: callers inject whatever
//! backend they have (local model, remote API, test double) behind this trait.
//!
//! The memory engine treats every failure here as degradable: a missing or
//! failing provider downgrades semantic search to full-text search instead of
//! surfacing an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that can occur during embedding operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingError {
    /// The provider is not reachable or not running.
    ProviderUnavailable { message: String },
    /// The input text exceeds the provider's maximum token/character limit.
    InputTooLong { message: String },
    /// The provider returned an unexpected or unparseable response.
    ParseError { message: String },
    /// Configuration is invalid or incomplete.
    InvalidConfig { message: String },
    /// Any other error.
    Other { message: String },
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable { message } => {
                write!(f, "provider unavailable: {}", message)
            }
            Self::InputTooLong { message } => write!(f, "input too long: {}", message),
            Self::ParseError { message } => write!(f, "parse error: {}", message),
            Self::InvalidConfig { message } => write!(f, "invalid config: {}", message),
            Self::Other { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for EmbeddingError {}

/// Convenience alias for embedding operation results.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// A pluggable text embedding backend.
///
/// Implementations must be `Send + Sync` so a single provider can be shared
/// between the indexer and the searcher behind an `Arc`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single piece of text into a dense vector.
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Human-readable provider name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}
