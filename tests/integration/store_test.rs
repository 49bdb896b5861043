//! Artifact Store Integration Tests
//!
//! - Durability across reopen (WAL checkpoint on close and drop)
//! - Save atomicity when the shadow index write fails
//! - Concurrent writers on a file-backed database
//! - Cancellation of long listings
//! - Quantized embedding storage driven by config

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cascade_memory::models::artifact::Artifact;
use cascade_memory::services::memory::ArtifactStore;
use cascade_memory::storage::config::MemoryConfig;
use cascade_memory::storage::database::Database;
use cascade_memory::storage::migrations::SCHEMA_VERSION;

// ============================================================================
// Helpers
// ============================================================================

fn open_store(path: &std::path::Path) -> ArtifactStore {
    let db = Database::open(path).expect("Failed to open test database");
    ArtifactStore::new(Arc::new(db))
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_artifacts_survive_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("memory.db");

    let artifact = Artifact::new("docs/plan.md", "doc", "Plan", "phase one")
        .with_feature("F001")
        .with_tags(["planning"]);
    {
        let store = open_store(&path);
        store.save(&artifact).unwrap();
        // Dropping the last handle runs the final checkpoint
    }

    let wal = tmp.path().join("memory.db-wal");
    if wal.exists() {
        assert_eq!(std::fs::metadata(&wal).unwrap().len(), 0);
    }

    let store = open_store(&path);
    assert_eq!(store.database().schema_version().unwrap(), SCHEMA_VERSION);
    assert_eq!(store.get_by_id(&artifact.id).unwrap().unwrap(), artifact);
    assert_eq!(store.search("phase").unwrap().len(), 1);
}

#[test]
fn test_concurrent_saves_are_serialized() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(open_store(&tmp.path().join("memory.db")));

    let errors: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    let mut errors = Vec::new();
                    for i in 0..200 {
                        let artifact = Artifact::new(
                            format!("w{}/doc-{}.md", worker, i),
                            "doc",
                            format!("Doc {} {}", worker, i),
                            "shared body",
                        );
                        if let Err(e) = store.save(&artifact) {
                            errors.push(e.to_string());
                        }
                        // Re-saving the same path is an update and must not conflict either
                        if i % 50 == 0 {
                            if let Err(e) = store.save(&artifact) {
                                errors.push(e.to_string());
                            }
                        }
                    }
                    errors
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    assert!(errors.is_empty(), "first error: {:?}", errors.first());
    assert_eq!(store.count().unwrap(), 1600);
}

#[test]
fn test_concurrent_deletes_and_saves() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(open_store(&tmp.path().join("memory.db")));
    let seeded: Vec<Artifact> = (0..100)
        .map(|i| Artifact::new(format!("old/{}.md", i), "doc", "Old", "x"))
        .collect();
    for artifact in &seeded {
        store.save(artifact).unwrap();
    }

    std::thread::scope(|scope| {
        let deleter = {
            let store = Arc::clone(&store);
            let seeded = &seeded;
            scope.spawn(move || {
                seeded
                    .iter()
                    .map(|a| store.delete(&a.id))
                    .collect::<Result<Vec<bool>, _>>()
            })
        };
        let writer = {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                (0..100).try_for_each(|i| {
                    store.save(&Artifact::new(format!("new/{}.md", i), "doc", "New", "y"))
                })
            })
        };
        assert!(deleter.join().unwrap().unwrap().into_iter().all(|d| d));
        writer.join().unwrap().unwrap();
    });

    assert_eq!(store.count().unwrap(), 100);
    assert!(store.search("y").unwrap().iter().all(|a| a.path.starts_with("new/")));
}

#[test]
fn test_explicit_close_then_drop() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("memory.db");
    let store = open_store(&path);
    store
        .save(&Artifact::new("a.md", "doc", "A", "x"))
        .unwrap();
    store.close().unwrap();
    drop(store);

    assert_eq!(open_store(&path).count().unwrap(), 1);
}

#[test]
fn test_failed_index_write_leaves_no_trace() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(&tmp.path().join("memory.db"));
    let survivor = Artifact::new("kept.md", "doc", "Kept", "before the fault");
    store.save(&survivor).unwrap();

    {
        let conn = store.database().get_connection().unwrap();
        conn.execute_batch(
            "DROP TABLE artifacts_fts;
             CREATE TABLE artifacts_fts (
                artifact_id TEXT CHECK (artifact_id IS NULL),
                title TEXT, content TEXT, tags TEXT
             );",
        )
        .unwrap();
    }

    let doomed = Artifact::new("doomed.md", "doc", "Doomed", "after the fault");
    assert!(store.save(&doomed).is_err());
    assert!(store.get_by_id(&doomed.id).unwrap().is_none());
    assert!(store.get_by_path("doomed.md").unwrap().is_none());

    // An update of an existing row rolls back too
    let rewrite = Artifact::new("kept.md", "doc", "Kept", "rewritten");
    assert!(store.save(&rewrite).is_err());
    assert_eq!(
        store.get_by_id(&survivor.id).unwrap().unwrap().content,
        "before the fault"
    );
}

#[test]
fn test_listing_stops_when_cancelled() {
    let store = ArtifactStore::new(Arc::new(Database::open_in_memory().unwrap()));
    for i in 0..20 {
        store
            .save(&Artifact::new(format!("doc-{:02}.md", i), "doc", "Doc", ""))
            .unwrap();
    }

    let token = CancellationToken::new();
    assert_eq!(store.list_all_with_cancel(&token).unwrap().len(), 20);

    token.cancel();
    let err = store.list_all_with_cancel(&token).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_config_enables_quantized_embeddings() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = MemoryConfig::default();
    config.database_path = Some(tmp.path().join("q.db"));
    config.quantize_embeddings = true;

    let db = Arc::new(Database::open_with_config(&config).unwrap());
    let store = ArtifactStore::from_config(db.clone(), &config);
    let artifact =
        Artifact::new("e.md", "doc", "E", "").with_embedding(vec![0.25, -0.5, 0.125, 0.0]);
    store.save(&artifact).unwrap();

    let conn = db.get_connection().unwrap();
    let (blob, scale): (Vec<u8>, Option<f64>) = conn
        .query_row(
            "SELECT embedding, embedding_scale FROM artifacts WHERE id = ?1",
            [&artifact.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    drop(conn);
    assert_eq!(blob.len(), 4);
    assert!(scale.is_some());

    let restored = store.get_by_id(&artifact.id).unwrap().unwrap().embedding.unwrap();
    for (a, b) in [0.25f32, -0.5, 0.125, 0.0].iter().zip(restored.iter()) {
        assert!((a - b).abs() <= 0.5 / 127.0 + 1e-6);
        assert!(a * b >= 0.0);
    }
}
