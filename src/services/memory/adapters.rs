//! Record Adapters
//!
//! Map externally produced records (evidence events, drift reports) onto the
//! generic artifact shape. The mapping is deterministic: re-importing the
//! same record yields the same path, ID and hash, so it updates in place or
//! is skipped.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::models::artifact::{artifact_types, content_hash, Artifact};
use crate::models::records::{DriftReport, EvidenceEvent};
use crate::services::memory::frontmatter::feature_from_workstream;
use crate::services::memory::store::ArtifactStore;
use crate::utils::error::AppResult;

/// A record that can be stored as an artifact.
pub trait IntoArtifact {
    fn to_artifact(&self) -> AppResult<Artifact>;
}

/// Counters for one import batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl IntoArtifact for EvidenceEvent {
    fn to_artifact(&self) -> AppResult<Artifact> {
        let hash = content_hash(&serde_json::to_vec(self)?);
        let mut content = format!(
            "type: {}\ntimestamp: {}\n",
            self.event_type,
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        );
        if let Some(ws) = &self.workstream_id {
            content.push_str(&format!("workstream: {}\n", ws));
        }
        if !self.payload.is_null() {
            content.push_str(&format!("payload: {}\n", serde_json::to_string_pretty(&self.payload)?));
        }

        let artifact = Artifact::new(
            format!("evidence/{}", self.id),
            artifact_types::EVIDENCE,
            format!("{} {}", self.event_type, self.id),
            content,
        )
        .with_tags([self.event_type.clone()])
        .with_file_hash(hash)
        .with_indexed_at(self.timestamp);

        Ok(with_workstream(artifact, self.workstream_id.as_deref()))
    }
}

impl IntoArtifact for DriftReport {
    fn to_artifact(&self) -> AppResult<Artifact> {
        let hash = content_hash(&serde_json::to_vec(self)?);
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true);

        let mut content = format!("verdict: {}\n", self.verdict);
        for issue in &self.issues {
            match &issue.file {
                Some(file) => content.push_str(&format!(
                    "- [{}] {}: {}\n",
                    issue.severity, file, issue.message
                )),
                None => content.push_str(&format!("- [{}] {}\n", issue.severity, issue.message)),
            }
        }

        let artifact = Artifact::new(
            format!("drift/{}/{}", self.workstream_id, timestamp),
            artifact_types::DRIFT,
            format!("Drift report {} ({})", self.workstream_id, self.verdict),
            content,
        )
        .with_tags([self.verdict.to_lowercase()])
        .with_file_hash(hash)
        .with_indexed_at(self.timestamp);

        Ok(with_workstream(artifact, Some(self.workstream_id.as_str())))
    }
}

fn with_workstream(mut artifact: Artifact, workstream_id: Option<&str>) -> Artifact {
    if let Some(ws) = workstream_id.map(str::trim).filter(|ws| !ws.is_empty()) {
        artifact.feature_id = feature_from_workstream(ws);
        artifact.workstream_id = Some(ws.to_string());
    }
    artifact
}

/// Upsert a batch of records, skipping those whose hash is unchanged.
pub fn import_records<T: IntoArtifact>(store: &ArtifactStore, records: &[T]) -> AppResult<ImportStats> {
    let mut stats = ImportStats::default();
    for record in records {
        let artifact = record.to_artifact()?;
        match store.get_by_path(&artifact.path)? {
            Some(existing) if existing.file_hash == artifact.file_hash => {
                stats.skipped += 1;
                continue;
            }
            Some(_) => stats.updated += 1,
            None => stats.imported += 1,
        }
        store.save(&artifact)?;
    }

    tracing::debug!(
        imported = stats.imported,
        updated = stats.updated,
        skipped = stats.skipped,
        "Imported records"
    );
    Ok(stats)
}
