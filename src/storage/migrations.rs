//! Schema Migrations
//!
//! Versioned schema evolution recorded in the `schema_version` table. Each
//! migration runs in its own transaction together with the row that records
//! it, so a crash mid-migration leaves the database at the last fully
//! committed version.

use rusqlite::{params, Connection, Transaction, TransactionBehavior};

use crate::utils::error::{AppError, AppResult};

/// Schema version this build expects.
pub const SCHEMA_VERSION: i64 = 3;

/// A single schema step.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub apply: fn(&Transaction) -> AppResult<()>,
}

/// All migrations, in ascending version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "artifacts table",
        apply: create_artifacts,
    },
    Migration {
        version: 2,
        description: "artifacts full-text index",
        apply: create_artifacts_fts,
    },
    Migration {
        version: 3,
        description: "event summaries",
        apply: create_event_summaries,
    },
];

fn create_artifacts(tx: &Transaction) -> AppResult<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS artifacts (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            artifact_type TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            embedding BLOB,
            embedding_scale REAL,
            feature_id TEXT,
            workstream_id TEXT,
            tags TEXT NOT NULL DEFAULT '',
            file_hash TEXT NOT NULL DEFAULT '',
            indexed_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_artifacts_type ON artifacts(artifact_type);
        CREATE INDEX IF NOT EXISTS idx_artifacts_feature ON artifacts(feature_id);
        CREATE INDEX IF NOT EXISTS idx_artifacts_workstream ON artifacts(workstream_id);
        CREATE INDEX IF NOT EXISTS idx_artifacts_file_hash ON artifacts(file_hash);",
    )?;
    Ok(())
}

fn create_artifacts_fts(tx: &Transaction) -> AppResult<()> {
    let created = tx.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS artifacts_fts USING fts5(
            artifact_id UNINDEXED,
            title,
            content,
            tags,
            tokenize = 'unicode61'
        )",
    );

    match created {
        Ok(()) => {}
        Err(e) if e.to_string().contains("no such module") => {
            // Substring-scan mode; the store checks for the table at open.
            tracing::warn!(error = %e, "FTS5 unavailable, full-text search will use substring scan");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    // Backfill rows written before the index existed
    tx.execute(
        "INSERT INTO artifacts_fts (artifact_id, title, content, tags)
         SELECT id, title, content, tags FROM artifacts",
        [],
    )?;
    Ok(())
}

fn create_event_summaries(tx: &Transaction) -> AppResult<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS event_summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workstream_id TEXT,
            summary TEXT NOT NULL,
            event_count INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_event_summaries_start
            ON event_summaries(start_time);",
    )?;
    Ok(())
}

/// Create the bookkeeping table if it is missing.
fn ensure_version_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL DEFAULT '',
            applied_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Highest applied schema version, or 0 for a fresh database.
pub fn current_version(conn: &Connection) -> AppResult<i64> {
    ensure_version_table(conn)?;
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Bring the database up to [`SCHEMA_VERSION`].
pub fn run_migrations(conn: &mut Connection) -> AppResult<i64> {
    apply_migrations(conn, MIGRATIONS)
}

/// Apply every migration in `migrations` newer than the recorded version.
///
/// Returns the version the database ends at.
pub(crate) fn apply_migrations(conn: &mut Connection, migrations: &[Migration]) -> AppResult<i64> {
    let mut current = current_version(conn)?;
    let expected = migrations.last().map(|m| m.version).unwrap_or(0);

    if current > expected {
        return Err(AppError::migration(format!(
            "database schema version {} is newer than supported version {}",
            current, expected
        )));
    }

    let start = current;
    for migration in migrations.iter().filter(|m| m.version > start) {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        (migration.apply)(&tx).map_err(|e| {
            AppError::migration(format!(
                "migration {} ({}) failed: {}",
                migration.version, migration.description, e
            ))
        })?;
        tx.execute(
            "INSERT INTO schema_version (version, description) VALUES (?1, ?2)",
            params![migration.version, migration.description],
        )?;
        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Applied schema migration"
        );
        current = migration.version;
    }

    Ok(current)
}
