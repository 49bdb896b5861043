//! Core Error Types
//!
//! Errors raised by the core crate's pure helpers. Kept dependency-free
//! (only thiserror + std) so the core crate stays lightweight.
//!
//! The main crate wraps these (`AppError::Core`) alongside its storage
//! variants (Database, Sqlite, Pool).

use thiserror::Error;

/// Core error type for the Cascade Memory workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Input rejected by an invariant check
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
