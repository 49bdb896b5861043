//! Storage Layer
//!
//! Handles all data persistence: the SQLite database, its schema migrations,
//! and the JSON config.

pub mod config;
pub mod database;
pub mod migrations;

pub use config::*;
pub use database::*;
pub use migrations::{current_version, run_migrations, SCHEMA_VERSION};
