//! Artifact Model
//!
//! The generic stored/searchable unit of the memory engine: a document,
//! evidence event, or drift report, all flattened into one shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Well-known artifact type tags. `artifact_type` stays an open string so new
/// producers can introduce their own without a schema change.
pub mod artifact_types {
    pub const DOC: &str = "doc";
    pub const CODE: &str = "code";
    pub const DRIFT: &str = "drift";
    pub const EVIDENCE: &str = "evidence";
}

/// Separator used to persist tags as a single column.
pub const TAG_SEPARATOR: char = ',';

/// A stored artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Stable identifier derived from `path`
    pub id: String,
    /// Logical location; unique across the store
    pub path: String,
    /// Classification tag (`doc`, `code`, `drift`, `evidence`, ...)
    pub artifact_type: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workstream_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Content checksum used as the idempotence key during indexing
    pub file_hash: String,
    pub indexed_at: DateTime<Utc>,
}

impl Artifact {
    /// Create an artifact whose ID is derived from `path` and whose hash is
    /// derived from `content`.
    pub fn new(
        path: impl Into<String>,
        artifact_type: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let content = content.into();
        Self {
            id: artifact_id_for_path(&path),
            file_hash: content_hash(content.as_bytes()),
            path,
            artifact_type: artifact_type.into(),
            title: title.into(),
            content,
            embedding: None,
            feature_id: None,
            workstream_id: None,
            tags: Vec::new(),
            indexed_at: Utc::now(),
        }
    }

    pub fn with_feature(mut self, feature_id: impl Into<String>) -> Self {
        self.feature_id = Some(feature_id.into());
        self
    }

    pub fn with_workstream(mut self, workstream_id: impl Into<String>) -> Self {
        self.workstream_id = Some(workstream_id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = normalize_tags(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Override the content hash (adapters hash the whole record, not just
    /// the rendered content).
    pub fn with_file_hash(mut self, file_hash: impl Into<String>) -> Self {
        self.file_hash = file_hash.into();
        self
    }

    pub fn with_indexed_at(mut self, indexed_at: DateTime<Utc>) -> Self {
        self.indexed_at = indexed_at;
        self
    }

    /// Tags joined into the single persisted column.
    pub fn tags_field(&self) -> String {
        self.tags.join(&TAG_SEPARATOR.to_string())
    }
}

/// Derive the stable artifact ID for a logical path.
///
/// Content-independent, so re-indexing the same location updates the same row.
pub fn artifact_id_for_path(path: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(path.as_bytes()));
    digest[..16].to_string()
}

/// Hex-encoded SHA-256 of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Split a persisted tag column back into tags.
pub fn parse_tags_field(field: &str) -> Vec<String> {
    normalize_tags(field.split(TAG_SEPARATOR).map(str::to_string))
}

/// Trim, drop empties and duplicates while keeping first-seen order.
pub fn normalize_tags(tags: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().replace(TAG_SEPARATOR, " ");
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
