//! Integration Tests Module
//!
//! End-to-end tests for the Cascade Memory engine against real SQLite
//! databases (in-memory and on-disk) and temporary document trees.

// Store durability, atomicity and cancellation tests
mod store_test;

// Incremental indexing tests
mod indexer_test;

// Search mode and hybrid ranking tests
mod search_test;

// Tiering, compaction and record import tests
mod compaction_test;
