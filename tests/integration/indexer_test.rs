//! Indexer Integration Tests
//!
//! - Idempotent re-index of an unchanged tree
//! - Hash-triggered update of a single file
//! - Gitignore handling and per-file error isolation
//! - Cancellation between files
//! - Parallel indexers over one file-backed database

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cascade_memory::services::memory::{ArtifactStore, IndexStats, Indexer};
use cascade_memory::storage::config::MemoryConfig;
use cascade_memory::storage::database::Database;

// ============================================================================
// Helpers
// ============================================================================

fn create_store() -> Arc<ArtifactStore> {
    let db = Database::open_in_memory().expect("Failed to create in-memory test database");
    Arc::new(ArtifactStore::new(Arc::new(db)))
}

fn write_tree(root: &Path) {
    fs::create_dir_all(root.join("features").join("auth")).unwrap();
    fs::write(
        root.join("features").join("auth").join("00-001-01-login.md"),
        "# Login\nPassword and token login.",
    )
    .unwrap();
    fs::write(
        root.join("features").join("auth").join("00-001-02-logout.md"),
        "---\ntitle: Logout\ntags: session, auth\n---\nEnds the session.",
    )
    .unwrap();
    fs::write(
        root.join("README.md"),
        "Project overview without a heading.",
    )
    .unwrap();
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_second_pass_over_unchanged_tree_skips_everything() {
    let tmp = tempfile::tempdir().unwrap();
    write_tree(tmp.path());
    let store = create_store();
    let indexer = Indexer::new(store.clone(), tmp.path());

    let first = indexer.index_directory().await.unwrap();
    assert_eq!(
        first,
        IndexStats {
            total_files: 3,
            indexed: 3,
            updated: 0,
            skipped: 0,
            errors: 0
        }
    );

    let second = indexer.index_directory().await.unwrap();
    assert_eq!(second.updated, 0);
    assert_eq!(second.indexed, 0);
    assert_eq!(second.skipped, second.total_files);
    assert_eq!(store.count().unwrap(), 3);
}

#[tokio::test]
async fn test_changing_one_file_updates_exactly_one() {
    let tmp = tempfile::tempdir().unwrap();
    write_tree(tmp.path());
    let store = create_store();
    let indexer = Indexer::new(store.clone(), tmp.path());
    indexer.index_directory().await.unwrap();

    let before = store.get_by_path("README.md").unwrap().unwrap();
    fs::write(tmp.path().join("README.md"), "# Overview\nNow with a heading.").unwrap();

    let stats = indexer.index_directory().await.unwrap();
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.indexed, 0);

    let after = store.get_by_path("README.md").unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_ne!(after.file_hash, before.file_hash);
    assert_eq!(after.title, "Overview");
    assert_eq!(store.count().unwrap(), 3);
}

#[tokio::test]
async fn test_metadata_resolution_across_the_tree() {
    let tmp = tempfile::tempdir().unwrap();
    write_tree(tmp.path());
    let store = create_store();
    Indexer::new(store.clone(), tmp.path())
        .index_directory()
        .await
        .unwrap();

    let login = store
        .get_by_path("features/auth/00-001-01-login.md")
        .unwrap()
        .unwrap();
    assert_eq!(login.title, "Login");
    assert_eq!(login.workstream_id.as_deref(), Some("00-001-01"));
    assert_eq!(login.feature_id.as_deref(), Some("F001"));

    let logout = store
        .get_by_path("features/auth/00-001-02-logout.md")
        .unwrap()
        .unwrap();
    assert_eq!(logout.title, "Logout");
    assert_eq!(logout.tags, vec!["session", "auth"]);

    let readme = store.get_by_path("README.md").unwrap().unwrap();
    assert_eq!(readme.title, "README");
    assert!(readme.feature_id.is_none());

    assert_eq!(store.list_by_feature("F001").unwrap().len(), 2);
}

#[tokio::test]
async fn test_bad_file_does_not_stop_the_walk() {
    let tmp = tempfile::tempdir().unwrap();
    write_tree(tmp.path());
    fs::write(tmp.path().join("binary.md"), [0xc3, 0x28, 0xa0, 0xa1]).unwrap();

    let store = create_store();
    let stats = Indexer::new(store.clone(), tmp.path())
        .index_directory()
        .await
        .unwrap();
    assert_eq!(stats.total_files, 4);
    assert_eq!(stats.indexed, 3);
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn test_gitignored_files_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    write_tree(tmp.path());
    // .gitignore is only honoured inside a git repository
    fs::create_dir(tmp.path().join(".git")).unwrap();
    fs::write(tmp.path().join(".gitignore"), "drafts/\n").unwrap();
    fs::create_dir(tmp.path().join("drafts")).unwrap();
    fs::write(tmp.path().join("drafts").join("wip.md"), "# WIP").unwrap();

    let store = create_store();
    let stats = Indexer::new(store.clone(), tmp.path())
        .index_directory()
        .await
        .unwrap();
    assert_eq!(stats.total_files, 3);
    assert!(store.get_by_path("drafts/wip.md").unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_indexing_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    write_tree(tmp.path());
    let store = create_store();
    let indexer = Indexer::new(store.clone(), tmp.path());

    let token = CancellationToken::new();
    token.cancel();
    let err = indexer.index_directory_with_cancel(&token).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_indexer_from_config() {
    let tmp = tempfile::tempdir().unwrap();
    write_tree(tmp.path());
    fs::write(tmp.path().join("notes.txt"), "plain text notes").unwrap();

    let mut config = MemoryConfig::default();
    config.docs_root = Some(tmp.path().to_path_buf());
    config.doc_extensions = vec!["md".into(), "txt".into()];

    let store = create_store();
    let stats = Indexer::from_config(store.clone(), &config)
        .unwrap()
        .index_directory()
        .await
        .unwrap();
    assert_eq!(stats.total_files, 4);
    assert_eq!(store.get_by_path("notes.txt").unwrap().unwrap().artifact_type, "doc");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_indexers_share_a_file_database() {
    let tmp = tempfile::tempdir().unwrap();
    let db = Database::open(&tmp.path().join("memory.db")).unwrap();
    let store = Arc::new(ArtifactStore::new(Arc::new(db)));

    let roots: Vec<_> = ["left", "right"]
        .iter()
        .map(|side| {
            let root = tmp.path().join(side);
            fs::create_dir_all(&root).unwrap();
            for i in 0..40 {
                fs::write(
                    root.join(format!("{}-{}.md", side, i)),
                    format!("# {} {}\nbody", side, i),
                )
                .unwrap();
            }
            root
        })
        .collect();

    let left = Indexer::new(store.clone(), &roots[0]);
    let right = Indexer::new(store.clone(), &roots[1]);
    let (a, b) = tokio::join!(left.index_directory(), right.index_directory());

    for stats in [a.unwrap(), b.unwrap()] {
        assert_eq!(stats.indexed, 40);
        assert_eq!(stats.errors, 0);
    }
    assert_eq!(store.count().unwrap(), 80);
}
