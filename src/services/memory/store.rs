//! Artifact Store
//!
//! Durable CRUD over the `artifacts` table with its FTS5 shadow index.
//! Every write covers the row and its index entry in one transaction, so a
//! reader never sees one without the other.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Params, Row, Transaction, TransactionBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::artifact::{parse_tags_field, Artifact};
use crate::models::records::EventSummary;
use cascade_memory_core::quantize::{
    bytes_to_quantized, dequantize, quantize, quantized_to_bytes,
};
use crate::storage::config::MemoryConfig;
use crate::storage::database::{CheckpointStats, Database};
use crate::utils::error::{AppError, AppResult};

/// Result cap for lexical search (both the FTS path and the substring scan).
pub const SEARCH_LIMIT: usize = 50;

const ARTIFACT_COLUMNS: &str = "id, path, artifact_type, title, content, embedding, \
     embedding_scale, feature_id, workstream_id, tags, file_hash, indexed_at";

const JOINED_ARTIFACT_COLUMNS: &str = "a.id, a.path, a.artifact_type, a.title, a.content, \
     a.embedding, a.embedding_scale, a.feature_id, a.workstream_id, a.tags, a.file_hash, \
     a.indexed_at";

/// Store for artifacts and compaction summaries.
pub struct ArtifactStore {
    db: Arc<Database>,
    quantize_embeddings: bool,
}

impl ArtifactStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            quantize_embeddings: false,
        }
    }

    /// Create a store honouring the configured embedding encoding
    pub fn from_config(db: Arc<Database>, config: &MemoryConfig) -> Self {
        Self::new(db).with_quantization(config.quantize_embeddings)
    }

    /// Store new embeddings as int8 + scale instead of f32
    pub fn with_quantization(mut self, enabled: bool) -> Self {
        self.quantize_embeddings = enabled;
        self
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    // ========================================================================
    // Write Operations
    // ========================================================================

    /// Insert or replace an artifact, keyed by ID.
    ///
    /// If another artifact already occupies the same path, that row and its
    /// index entry are removed in the same transaction; its ID is orphaned.
    pub fn save(&self, artifact: &Artifact) -> AppResult<()> {
        let (embedding, scale) = self.encode_embedding(artifact)?;

        let mut conn = self.db.get_connection()?;
        // Write lock before the first read, or concurrent writers get SQLITE_BUSY
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let occupant: Option<String> = tx
            .query_row(
                "SELECT id FROM artifacts WHERE path = ?1",
                params![artifact.path],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(old_id) = occupant.filter(|id| id != &artifact.id) {
            self.delete_in_tx(&tx, &old_id)?;
            tracing::warn!(
                path = %artifact.path,
                orphaned_id = %old_id,
                id = %artifact.id,
                "Replaced artifact with a different ID at the same path"
            );
        }

        tx.execute(
            "INSERT INTO artifacts (id, path, artifact_type, title, content, embedding,
                                    embedding_scale, feature_id, workstream_id, tags,
                                    file_hash, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                artifact_type = excluded.artifact_type,
                title = excluded.title,
                content = excluded.content,
                embedding = excluded.embedding,
                embedding_scale = excluded.embedding_scale,
                feature_id = excluded.feature_id,
                workstream_id = excluded.workstream_id,
                tags = excluded.tags,
                file_hash = excluded.file_hash,
                indexed_at = excluded.indexed_at",
            params![
                artifact.id,
                artifact.path,
                artifact.artifact_type,
                artifact.title,
                artifact.content,
                embedding,
                scale,
                artifact.feature_id,
                artifact.workstream_id,
                artifact.tags_field(),
                artifact.file_hash,
                artifact.indexed_at.to_rfc3339(),
            ],
        )?;

        if self.db.fts_enabled() {
            tx.execute(
                "DELETE FROM artifacts_fts WHERE artifact_id = ?1",
                params![artifact.id],
            )?;
            tx.execute(
                "INSERT INTO artifacts_fts (artifact_id, title, content, tags)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    artifact.id,
                    artifact.title,
                    artifact.content,
                    artifact.tags_field()
                ],
            )?;
        }

        tx.commit().map_err(|e| {
            AppError::database(format!("Failed to save artifact {}: {}", artifact.id, e))
        })?;
        Ok(())
    }

    pub fn save_with_cancel(&self, artifact: &Artifact, cancel: &CancellationToken) -> AppResult<()> {
        check_cancelled(cancel, "save")?;
        self.save(artifact)
    }

    /// Delete an artifact and its index entry. Returns whether a row existed.
    pub fn delete(&self, id: &str) -> AppResult<bool> {
        let mut conn = self.db.get_connection()?;
        // Write lock before the first read, or concurrent writers get SQLITE_BUSY
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = self.delete_in_tx(&tx, id)?;
        tx.commit()?;
        Ok(deleted)
    }

    pub fn delete_with_cancel(&self, id: &str, cancel: &CancellationToken) -> AppResult<bool> {
        check_cancelled(cancel, "delete")?;
        self.delete(id)
    }

    fn delete_in_tx(&self, tx: &Transaction, id: &str) -> AppResult<bool> {
        if self.db.fts_enabled() {
            tx.execute(
                "DELETE FROM artifacts_fts WHERE artifact_id = ?1",
                params![id],
            )?;
        }
        let rows = tx.execute("DELETE FROM artifacts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // ========================================================================
    // Read Operations
    // ========================================================================

    pub fn get_by_id(&self, id: &str) -> AppResult<Option<Artifact>> {
        self.query_one(
            &format!("SELECT {} FROM artifacts WHERE id = ?1", ARTIFACT_COLUMNS),
            params![id],
        )
    }

    pub fn get_by_id_with_cancel(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> AppResult<Option<Artifact>> {
        check_cancelled(cancel, "get")?;
        self.get_by_id(id)
    }

    pub fn get_by_path(&self, path: &str) -> AppResult<Option<Artifact>> {
        self.query_one(
            &format!("SELECT {} FROM artifacts WHERE path = ?1", ARTIFACT_COLUMNS),
            params![path],
        )
    }

    /// Most recently written artifact with the given content hash.
    ///
    /// Hashes are not unique across paths; identical content at two paths
    /// yields whichever was indexed last.
    pub fn get_by_file_hash(&self, hash: &str) -> AppResult<Option<Artifact>> {
        self.query_one(
            &format!(
                "SELECT {} FROM artifacts WHERE file_hash = ?1
                 ORDER BY indexed_at DESC, path ASC LIMIT 1",
                ARTIFACT_COLUMNS
            ),
            params![hash],
        )
    }

    /// Lexical search over title, content and tags.
    ///
    /// Uses FTS5 when available; if the FTS query itself fails, falls back
    /// to a case-insensitive substring scan over title and content.
    pub fn search(&self, query: &str) -> AppResult<Vec<Artifact>> {
        self.search_inner(query, None)
    }

    pub fn search_with_cancel(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<Artifact>> {
        self.search_inner(query, Some(cancel))
    }

    fn search_inner(&self, query: &str, cancel: Option<&CancellationToken>) -> AppResult<Vec<Artifact>> {
        if let Some(token) = cancel {
            check_cancelled(token, "search")?;
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        if self.db.fts_enabled() {
            match self.fts_search(query) {
                Ok(results) => return Ok(results),
                Err(e) => {
                    tracing::warn!(
                        query = %query,
                        error = %e,
                        "FTS query failed, falling back to substring scan"
                    );
                }
            }
            if let Some(token) = cancel {
                check_cancelled(token, "search")?;
            }
        }

        self.substring_search(query, cancel)
    }

    fn fts_search(&self, query: &str) -> AppResult<Vec<Artifact>> {
        let sanitized = sanitize_fts_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        self.query_many(
            &format!(
                "SELECT {} FROM artifacts_fts
                 JOIN artifacts a ON a.id = artifacts_fts.artifact_id
                 WHERE artifacts_fts MATCH ?1
                 ORDER BY artifacts_fts.rank, a.path
                 LIMIT ?2",
                JOINED_ARTIFACT_COLUMNS
            ),
            params![sanitized, SEARCH_LIMIT as i64],
            None,
        )
    }

    fn substring_search(
        &self,
        query: &str,
        cancel: Option<&CancellationToken>,
    ) -> AppResult<Vec<Artifact>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        self.query_many(
            &format!(
                "SELECT {} FROM artifacts
                 WHERE title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\'
                 ORDER BY path
                 LIMIT ?2",
                ARTIFACT_COLUMNS
            ),
            params![pattern, SEARCH_LIMIT as i64],
            cancel,
        )
    }

    pub fn list_by_type(&self, artifact_type: &str) -> AppResult<Vec<Artifact>> {
        self.list_by_type_inner(artifact_type, None)
    }

    pub fn list_by_type_with_cancel(
        &self,
        artifact_type: &str,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<Artifact>> {
        self.list_by_type_inner(artifact_type, Some(cancel))
    }

    fn list_by_type_inner(
        &self,
        artifact_type: &str,
        cancel: Option<&CancellationToken>,
    ) -> AppResult<Vec<Artifact>> {
        self.query_many(
            &format!(
                "SELECT {} FROM artifacts WHERE artifact_type = ?1 ORDER BY path",
                ARTIFACT_COLUMNS
            ),
            params![artifact_type],
            cancel,
        )
    }

    pub fn list_all(&self) -> AppResult<Vec<Artifact>> {
        self.list_all_inner(None)
    }

    /// Like [`list_all`](Self::list_all), checking the token between rows.
    pub fn list_all_with_cancel(&self, cancel: &CancellationToken) -> AppResult<Vec<Artifact>> {
        self.list_all_inner(Some(cancel))
    }

    fn list_all_inner(&self, cancel: Option<&CancellationToken>) -> AppResult<Vec<Artifact>> {
        self.query_many(
            &format!("SELECT {} FROM artifacts ORDER BY path", ARTIFACT_COLUMNS),
            [],
            cancel,
        )
    }

    pub fn list_by_feature(&self, feature_id: &str) -> AppResult<Vec<Artifact>> {
        self.query_many(
            &format!(
                "SELECT {} FROM artifacts WHERE feature_id = ?1 ORDER BY path",
                ARTIFACT_COLUMNS
            ),
            params![feature_id],
            None,
        )
    }

    pub fn list_by_workstream(&self, workstream_id: &str) -> AppResult<Vec<Artifact>> {
        self.query_many(
            &format!(
                "SELECT {} FROM artifacts WHERE workstream_id = ?1 ORDER BY path",
                ARTIFACT_COLUMNS
            ),
            params![workstream_id],
            None,
        )
    }

    /// Artifacts that carry a stored embedding
    pub fn list_with_embeddings(&self) -> AppResult<Vec<Artifact>> {
        self.query_many(
            &format!(
                "SELECT {} FROM artifacts WHERE embedding IS NOT NULL ORDER BY path",
                ARTIFACT_COLUMNS
            ),
            [],
            None,
        )
    }

    pub fn count(&self) -> AppResult<usize> {
        let conn = self.db.get_connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========================================================================
    // Event Summaries
    // ========================================================================

    /// Persist one compaction summary, returning its row ID
    pub fn save_summary(&self, summary: &EventSummary) -> AppResult<i64> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO event_summaries (workstream_id, summary, event_count, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                summary.workstream_id,
                summary.summary,
                summary.event_count as i64,
                summary.start_time.to_rfc3339(),
                summary.end_time.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All summaries in chronological order
    pub fn list_summaries(&self) -> AppResult<Vec<EventSummary>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT workstream_id, summary, event_count, start_time, end_time
             FROM event_summaries ORDER BY start_time, id",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(EventSummary {
                    workstream_id: row.get(0)?,
                    summary: row.get(1)?,
                    event_count: row.get::<_, i64>(2)? as usize,
                    start_time: parse_timestamp(row, 3)?,
                    end_time: parse_timestamp(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    pub fn database_size_bytes(&self) -> AppResult<u64> {
        self.db.size_bytes()
    }

    pub fn checkpoint(&self) -> AppResult<CheckpointStats> {
        self.db.checkpoint()
    }

    /// Run the final checkpoint on the underlying database
    pub fn close(&self) -> AppResult<()> {
        self.db.close()
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn encode_embedding(&self, artifact: &Artifact) -> AppResult<(Option<Vec<u8>>, Option<f64>)> {
        let embedding = match artifact.embedding.as_deref() {
            Some(e) if !e.is_empty() => e,
            _ => return Ok((None, None)),
        };

        if self.quantize_embeddings {
            let (quantized, scale) = quantize(embedding).inspect_err(|e| {
                tracing::warn!(id = %artifact.id, error = %e, "Rejected embedding");
            })?;
            Ok((Some(quantized_to_bytes(&quantized)), Some(scale as f64)))
        } else {
            Ok((Some(embedding_to_bytes(embedding)), None))
        }
    }

    fn query_one<P: Params>(&self, sql: &str, params: P) -> AppResult<Option<Artifact>> {
        let conn = self.db.get_connection()?;
        let artifact = conn.query_row(sql, params, row_to_artifact).optional()?;
        Ok(artifact)
    }

    fn query_many<P: Params>(
        &self,
        sql: &str,
        params: P,
        cancel: Option<&CancellationToken>,
    ) -> AppResult<Vec<Artifact>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;

        let mut artifacts = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(token) = cancel {
                check_cancelled(token, "listing artifacts")?;
            }
            artifacts.push(row_to_artifact(row)?);
        }
        Ok(artifacts)
    }
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("quantize_embeddings", &self.quantize_embeddings)
            .finish()
    }
}

fn check_cancelled(token: &CancellationToken, operation: &str) -> AppResult<()> {
    if token.is_cancelled() {
        return Err(AppError::cancelled(format!("{} cancelled", operation)));
    }
    Ok(())
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Map a row selected with the artifact column list to an Artifact
fn row_to_artifact(row: &Row) -> rusqlite::Result<Artifact> {
    let embedding_bytes: Option<Vec<u8>> = row.get(5)?;
    let scale: Option<f64> = row.get(6)?;
    let embedding = embedding_bytes.map(|bytes| match scale {
        Some(scale) => dequantize(&bytes_to_quantized(&bytes), scale as f32),
        None => bytes_to_embedding(&bytes),
    });
    let tags: String = row.get(9)?;

    Ok(Artifact {
        id: row.get(0)?,
        path: row.get(1)?,
        artifact_type: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        embedding,
        feature_id: row.get(7)?,
        workstream_id: row.get(8)?,
        tags: parse_tags_field(&tags),
        file_hash: row.get(10)?,
        indexed_at: parse_timestamp(row, 11)?,
    })
}

/// Serialize an f32 embedding to a little-endian BLOB
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize a little-endian BLOB back to an f32 embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Quote every whitespace token and add a prefix wildcard, so user input can
/// never be parsed as FTS5 syntax.
pub fn sanitize_fts_query(input: &str) -> String {
    input
        .split_whitespace()
        .map(|token| format!("\"{}\"*", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
