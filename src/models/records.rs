//! External Record Models
//!
//! Records produced outside the memory engine (evidence events, drift
//! reports) and the compaction output that summarizes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An evidence/audit event as handed over by the evidence log.
///
/// The engine treats it as an opaque record; the hash chain that links
/// events together is neither defined nor verified here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workstream_id: Option<String>,
    /// Free-form typed payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Severity of a single drift finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftSeverity::Info => write!(f, "info"),
            DriftSeverity::Warning => write!(f, "warning"),
            DriftSeverity::Error => write!(f, "error"),
        }
    }
}

/// One issue inside a drift report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftIssue {
    pub severity: DriftSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub message: String,
}

/// A drift report comparing a workstream's documentation with its code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub workstream_id: String,
    pub timestamp: DateTime<Utc>,
    pub verdict: String,
    #[serde(default)]
    pub issues: Vec<DriftIssue>,
}

/// Aggregate of N raw events, produced only by the compactor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Representative workstream of the batch (most frequent one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workstream_id: Option<String>,
    pub summary: String,
    pub event_count: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}
