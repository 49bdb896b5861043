//! SQLite Database
//!
//! Embedded database for persistent storage using rusqlite with r2d2 connection
//! pooling. The file database runs in WAL mode so readers are not blocked by an
//! in-flight write; a `TRUNCATE` checkpoint runs on `close()` and again when
//! the last handle is dropped.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::storage::config::MemoryConfig;
use crate::storage::migrations::{current_version, run_migrations};
use crate::utils::error::{AppError, AppResult};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled connection handed out by [`Database::get_connection`]
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Name of the lexical shadow index
pub const FTS_TABLE: &str = "artifacts_fts";

/// Outcome of a WAL checkpoint (`PRAGMA wal_checkpoint`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointStats {
    /// Non-zero when a writer blocked the checkpoint from completing
    pub busy: i64,
    /// Frames in the WAL (-1 when not in WAL mode)
    pub log_frames: i64,
    /// Frames copied back into the database file
    pub checkpointed_frames: i64,
}

/// Database service owning the SQLite file.
///
/// Share it as `Arc<Database>`; dropping the last handle runs the final
/// durability checkpoint.
pub struct Database {
    pool: DbPool,
    path: Option<PathBuf>,
    fts_enabled: bool,
    closed: AtomicBool,
}

impl Database {
    /// Open (or create) the database file at `path` and migrate it.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::database(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;
                 PRAGMA synchronous = NORMAL;",
            )
        });
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| {
                AppError::database(format!(
                    "Failed to open database {}: {}",
                    path.display(),
                    e
                ))
            })?;

        {
            let conn = pool.get()?;
            let mode: String =
                conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            if !mode.eq_ignore_ascii_case("wal") {
                tracing::warn!(path = %path.display(), mode = %mode, "WAL mode not available");
            }
        }

        Self::initialize(pool, Some(path.to_path_buf()))
    }

    /// Open the database configured in `config`.
    pub fn open_with_config(config: &MemoryConfig) -> AppResult<Self> {
        let path = config.resolved_database_path()?;
        Self::open(&path)
    }

    /// Create an in-memory database for testing.
    ///
    /// Uses a pool of one connection, since every SQLite in-memory connection
    /// is its own database.
    pub fn open_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        Self::initialize(pool, None)
    }

    fn initialize(pool: DbPool, path: Option<PathBuf>) -> AppResult<Self> {
        let fts_enabled = {
            let mut conn = pool.get()?;
            let version = run_migrations(&mut conn)?;
            tracing::debug!(version, "Database schema ready");
            Self::table_exists(&conn, FTS_TABLE)?
        };

        Ok(Self {
            pool,
            path,
            fts_enabled,
            closed: AtomicBool::new(false),
        })
    }

    fn table_exists(conn: &rusqlite::Connection, name: &str) -> AppResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> AppResult<DbConnection> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Get access to the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Database file path (`None` for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the FTS5 shadow index exists
    pub fn fts_enabled(&self) -> bool {
        self.fts_enabled
    }

    /// Currently applied schema version
    pub fn schema_version(&self) -> AppResult<i64> {
        let conn = self.get_connection()?;
        current_version(&conn)
    }

    /// Size of the main database file in bytes (page_count * page_size).
    pub fn size_bytes(&self) -> AppResult<u64> {
        let conn = self.get_connection()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok((page_count.max(0) as u64) * (page_size.max(0) as u64))
    }

    /// Check that a connection can be obtained and used
    pub fn is_healthy(&self) -> bool {
        self.get_connection()
            .and_then(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(AppError::from)
            })
            .is_ok()
    }

    /// Fold the WAL back into the database file and truncate it.
    pub fn checkpoint(&self) -> AppResult<CheckpointStats> {
        let conn = self.get_connection()?;
        let stats = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
            Ok(CheckpointStats {
                busy: row.get(0)?,
                log_frames: row.get(1)?,
                checkpointed_frames: row.get(2)?,
            })
        })?;
        tracing::debug!(
            busy = stats.busy,
            log_frames = stats.log_frames,
            checkpointed = stats.checkpointed_frames,
            "WAL checkpoint"
        );
        Ok(stats)
    }

    /// Run the final checkpoint. Later calls (and the drop) are no-ops.
    pub fn close(&self) -> AppResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.checkpoint().map(|_| ())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Final WAL checkpoint failed");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("fts_enabled", &self.fts_enabled)
            .finish()
    }
}
