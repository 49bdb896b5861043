//! Data Models
//!
//! Contains the data structures stored and exchanged by the memory engine.

pub mod artifact;
pub mod records;

pub use artifact::*;
pub use records::*;
