//! Tiering and Compaction Integration Tests
//!
//! - Batching of events into summaries in time order
//! - Compaction triggers (size, retention) and persisted summaries
//! - Tier statistics over imported records

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use cascade_memory::models::records::{DriftReport, EvidenceEvent};
use cascade_memory::services::memory::{
    import_records, ArtifactStore, Compactor, Tier, TierManager, TierPolicy,
};
use cascade_memory::storage::database::Database;

// ============================================================================
// Helpers
// ============================================================================

fn create_store() -> ArtifactStore {
    let db = Database::open_in_memory().expect("Failed to create in-memory test database");
    ArtifactStore::new(Arc::new(db))
}

fn events(count: usize, start: DateTime<Utc>) -> Vec<EvidenceEvent> {
    (0..count)
        .map(|i| EvidenceEvent {
            id: format!("evt-{:03}", i),
            event_type: (if i % 3 == 0 { "verification" } else { "build" }).to_string(),
            timestamp: start + Duration::minutes(i as i64),
            workstream_id: Some("00-007-01".to_string()),
            payload: json!({ "seq": i }),
        })
        .rev()
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_twenty_five_events_make_three_summaries() {
    let compactor = Compactor::new(TierPolicy::default()).unwrap();
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let input = events(25, start);

    let summaries = compactor.compact_events(&input);
    let counts: Vec<usize> = summaries.iter().map(|s| s.event_count).collect();
    assert_eq!(counts, vec![10, 10, 5]);

    for pair in summaries.windows(2) {
        assert!(pair[0].start_time <= pair[0].end_time);
        assert!(pair[0].end_time < pair[1].start_time);
    }
    assert_eq!(summaries[0].start_time, start);
    assert_eq!(summaries[2].end_time, start + Duration::minutes(24));
    assert!(summaries
        .iter()
        .all(|s| s.workstream_id.as_deref() == Some("00-007-01")));
}

#[test]
fn test_fresh_events_are_never_compacted() {
    let store = create_store();
    let now = Utc::now();
    let policy = TierPolicy {
        max_db_size_mb: 1,
        ..TierPolicy::default()
    };
    let compactor = Compactor::new(policy.clone()).unwrap();
    let manager = TierManager::new(policy).unwrap();

    let fresh = events(5, now - Duration::hours(1));
    assert!(manager.needs_compaction(2 * 1024 * 1024, None, now));

    let outcome = compactor.run(&store, &fresh, now).unwrap();
    assert!(outcome.is_empty());
}

#[test]
fn test_retention_trigger_persists_summaries() {
    let store = create_store();
    let now = Utc::now();
    let compactor = Compactor::new(TierPolicy::default()).unwrap();

    let mut input = events(25, now - Duration::days(200));
    input.extend(events(3, now - Duration::days(2)).into_iter().map(|mut e| {
        e.id = format!("recent-{}", e.id);
        e
    }));

    let outcome = compactor.run(&store, &input, now).unwrap();
    assert_eq!(outcome.summaries.len(), 3);
    assert_eq!(outcome.compacted_event_ids.len(), 25);
    assert!(outcome
        .compacted_event_ids
        .iter()
        .all(|id| !id.starts_with("recent-")));
    assert_eq!(store.list_summaries().unwrap(), outcome.summaries);
}

#[test]
fn test_tier_stats_over_imported_records() {
    let store = create_store();
    let now = Utc::now();

    let mut records = events(2, now - Duration::days(1));
    records.extend(events(1, now - Duration::days(60)).into_iter().map(|mut e| {
        e.id = "warm-1".to_string();
        e
    }));
    records.extend(events(1, now - Duration::days(365)).into_iter().map(|mut e| {
        e.id = "ancient-1".to_string();
        e
    }));
    let stats = import_records(&store, &records).unwrap();
    assert_eq!(stats.imported, 4);

    let report = DriftReport {
        workstream_id: "00-007-01".into(),
        timestamp: now - Duration::days(100),
        verdict: "PASS".into(),
        issues: vec![],
    };
    import_records(&store, &[report]).unwrap();

    let mut manager = TierManager::new(TierPolicy::default()).unwrap();
    let tiers = manager.rebuild_stats(&store, now).unwrap();
    assert_eq!(tiers.count(Tier::Hot), 2);
    assert_eq!(tiers.count(Tier::Warm), 1);
    assert_eq!(tiers.count(Tier::Cold), 1);
    assert_eq!(tiers.count(Tier::Archived), 1);
    assert_eq!(tiers.total(), store.count().unwrap());

    manager.archive(Tier::Cold).unwrap();
    assert_eq!(manager.stats().archived, 2);
    // Archiving is bookkeeping only
    assert_eq!(store.count().unwrap(), 5);
}
