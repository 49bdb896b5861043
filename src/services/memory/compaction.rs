//! Event Compaction
//!
//! Folds old evidence events into summaries of `compaction_ratio` events
//! each, in time order. Summaries keep only the count, time span, event
//! types and representative workstream; per-event detail is dropped.
//! Deleting the summarised events is left to the caller.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::records::{EventSummary, EvidenceEvent};
use crate::services::memory::store::ArtifactStore;
use crate::services::memory::tiering::{TierManager, TierPolicy};
use crate::utils::error::AppResult;

/// Result of a compaction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactionOutcome {
    /// Summaries written to the store
    pub summaries: Vec<EventSummary>,
    /// Events covered by those summaries, in time order
    pub compacted_event_ids: Vec<String>,
}

impl CompactionOutcome {
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

pub struct Compactor {
    tiers: TierManager,
}

impl Compactor {
    /// Fails when the policy is invalid (e.g. a zero compaction ratio).
    pub fn new(policy: TierPolicy) -> AppResult<Self> {
        Ok(Self {
            tiers: TierManager::new(policy)?,
        })
    }

    pub fn policy(&self) -> &TierPolicy {
        self.tiers.policy()
    }

    /// Summarise `events` in batches of `compaction_ratio`, oldest first.
    ///
    /// Produces `ceil(events.len() / ratio)` summaries.
    pub fn compact_events(&self, events: &[EvidenceEvent]) -> Vec<EventSummary> {
        let mut ordered: Vec<&EvidenceEvent> = events.iter().collect();
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        ordered
            .chunks(self.policy().compaction_ratio.max(1))
            .map(summarize_batch)
            .collect()
    }

    /// Compact events older than the retention window, if compaction is due.
    ///
    /// Summaries are persisted in `store`; the IDs of the events they cover
    /// are returned so the caller can remove the originals.
    pub fn run(
        &self,
        store: &ArtifactStore,
        events: &[EvidenceEvent],
        now: DateTime<Utc>,
    ) -> AppResult<CompactionOutcome> {
        let size = store.database_size_bytes()?;
        let oldest = events.iter().map(|e| e.timestamp).min();
        if !self.tiers.needs_compaction(size, oldest, now) {
            tracing::debug!(size_bytes = size, events = events.len(), "Compaction not needed");
            return Ok(CompactionOutcome::default());
        }

        let cutoff = self.policy().retention_cutoff(now);
        let expired: Vec<EvidenceEvent> = events
            .iter()
            .filter(|e| e.timestamp < cutoff)
            .cloned()
            .collect();
        if expired.is_empty() {
            tracing::info!(
                size_bytes = size,
                "Database over size budget but no events past retention"
            );
            return Ok(CompactionOutcome::default());
        }

        let summaries = self.compact_events(&expired);
        for summary in &summaries {
            store.save_summary(summary)?;
        }

        let mut ordered = expired;
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        let compacted_event_ids: Vec<String> = ordered.into_iter().map(|e| e.id).collect();

        tracing::info!(
            events = compacted_event_ids.len(),
            summaries = summaries.len(),
            cutoff = %cutoff.to_rfc3339_opts(SecondsFormat::Secs, true),
            "Compacted expired events"
        );
        Ok(CompactionOutcome {
            summaries,
            compacted_event_ids,
        })
    }
}

fn summarize_batch(batch: &[&EvidenceEvent]) -> EventSummary {
    let start_time = batch.first().map(|e| e.timestamp).unwrap_or_else(Utc::now);
    let end_time = batch.last().map(|e| e.timestamp).unwrap_or(start_time);
    let workstream_id = representative_workstream(batch);
    let types: BTreeSet<&str> = batch.iter().map(|e| e.event_type.as_str()).collect();

    let mut summary = format!(
        "{} {} ({} {}: {})",
        batch.len(),
        if batch.len() == 1 { "event" } else { "events" },
        types.len(),
        if types.len() == 1 { "type" } else { "types" },
        types.into_iter().collect::<Vec<_>>().join(", ")
    );
    if let Some(ws) = &workstream_id {
        summary.push_str(&format!(" for {}", ws));
    }
    summary.push_str(&format!(
        " between {} and {}",
        start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        end_time.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));

    EventSummary {
        workstream_id,
        summary,
        event_count: batch.len(),
        start_time,
        end_time,
    }
}

/// Most frequent workstream in the batch; ties go to the one seen first.
fn representative_workstream(batch: &[&EvidenceEvent]) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, event) in batch.iter().enumerate() {
        if let Some(ws) = event.workstream_id.as_deref() {
            counts.entry(ws).or_insert((0, position)).0 += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then_with(|| first_b.cmp(first_a))
        })
        .map(|(ws, _)| ws.to_string())
}
