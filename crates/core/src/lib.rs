//! Cascade Memory Core
//!
//! Foundational error types, the pluggable embedding seam and the
//! embedding quantizer for the Cascade Memory
//! workspace. This crate has zero dependencies on storage or
//! application-level code (SQLite, file walking, etc.).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `embedding` - Embedding provider trait (`EmbeddingProvider`, `EmbeddingError`)
//! - `quantize` - int8 embedding codec

pub mod embedding;
pub mod error;
pub mod quantize;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Embedding Seam ─────────────────────────────────────────────────────
pub use embedding::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

// ── Quantization ───────────────────────────────────────────────────────
pub use quantize::{dequantize, quantize};
