//! Search Integration Tests
//!
//! - Graph mode over feature groupings
//! - Hybrid equals fts ranking when no embedder or filter is present
//! - Weighted hybrid composition with a mock embedding provider
//! - End-to-end: index a tree with embeddings, then search it

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use async_trait::async_trait;

use cascade_memory::models::artifact::Artifact;
use cascade_memory::services::memory::{
    ArtifactStore, Indexer, SearchMode, SearchOptions, SearchResponse, Searcher,
};
use cascade_memory::storage::database::Database;
use cascade_memory::{EmbeddingProvider, EmbeddingResult};

// ============================================================================
// Helpers
// ============================================================================

/// Two-dimensional keyword embedding: [mentions login, mentions billing].
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let t = text.to_lowercase();
        Ok(vec![
            if t.contains("login") { 1.0 } else { 0.0 },
            if t.contains("billing") { 1.0 } else { 0.0 },
        ])
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

fn create_store() -> Arc<ArtifactStore> {
    let db = Database::open_in_memory().expect("Failed to create in-memory test database");
    Arc::new(ArtifactStore::new(Arc::new(db)))
}

/// Two F001 artifacts and one F002 artifact.
fn seed_features(store: &ArtifactStore) {
    let artifacts = [
        Artifact::new("f001-a.md", "doc", "Login design", "Part of F001 login.")
            .with_feature("F001")
            .with_embedding(vec![1.0, 0.0]),
        Artifact::new("f001-b.md", "doc", "Login tests", "F001 coverage")
            .with_feature("F001")
            .with_embedding(vec![1.0, 1.0]),
        Artifact::new("f002.md", "doc", "Billing", "F002 billing, depends on F001")
            .with_feature("F002")
            .with_embedding(vec![0.5, 1.0]),
    ];
    for artifact in &artifacts {
        store.save(artifact).unwrap();
    }
}

fn paths(response: &SearchResponse) -> Vec<&str> {
    response
        .results
        .iter()
        .map(|r| r.artifact.path.as_str())
        .collect()
}

fn scores(response: &SearchResponse) -> HashMap<String, f32> {
    response
        .results
        .iter()
        .map(|r| (r.artifact.path.clone(), r.score))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_graph_mode_returns_feature_members() {
    let store = create_store();
    seed_features(&store);
    let searcher = Searcher::new(store);

    let response = searcher
        .search("F001", &SearchOptions::new(SearchMode::Graph).with_feature("F001"))
        .await
        .unwrap();

    assert!(!response.degraded);
    assert_eq!(response.total, 2);
    assert_eq!(paths(&response), vec!["f001-a.md", "f001-b.md"]);
}

#[tokio::test]
async fn test_hybrid_without_embedder_matches_fts_ranking() {
    let store = create_store();
    seed_features(&store);
    let searcher = Searcher::new(store);

    let fts = searcher
        .search("F001", &SearchOptions::new(SearchMode::Fts))
        .await
        .unwrap();
    let hybrid = searcher
        .search("F001", &SearchOptions::new(SearchMode::Hybrid))
        .await
        .unwrap();

    assert_eq!(fts.total, 3);
    assert_eq!(paths(&hybrid), paths(&fts));
    assert_eq!(hybrid.total, fts.total);
    assert!(hybrid.degraded);

    // Semantic falls back to fts, so both weighted terms carry the fts score
    let fts_scores = scores(&fts);
    for result in &hybrid.results {
        let expected = 0.8 * fts_scores[&result.artifact.path];
        assert!((result.score - expected).abs() < 1e-5);
    }
}

#[tokio::test]
async fn test_hybrid_score_is_weighted_sum_of_modes() {
    let store = create_store();
    seed_features(&store);
    let searcher = Searcher::new(store).with_embedding_provider(Arc::new(KeywordEmbedder));
    let run = |mode| SearchOptions::new(mode).with_feature("F001");

    let fts = scores(&searcher.search("login", &run(SearchMode::Fts)).await.unwrap());
    let semantic = scores(&searcher.search("login", &run(SearchMode::Semantic)).await.unwrap());
    let graph = scores(&searcher.search("login", &run(SearchMode::Graph)).await.unwrap());
    let hybrid = searcher.search("login", &run(SearchMode::Hybrid)).await.unwrap();
    assert!(!hybrid.degraded);

    // Found by all three modes
    let a = "f001-a.md";
    let expected_a = 0.4 * fts[a] + 0.4 * semantic[a] + 0.2 * graph[a];
    assert!((scores(&hybrid)[a] - expected_a).abs() < 1e-5);
    assert!((expected_a - 1.0).abs() < 1e-5);

    let b = "f001-b.md";
    let expected_b = 0.4 * fts[b] + 0.4 * semantic[b] + 0.2 * graph[b];
    assert!((scores(&hybrid)[b] - expected_b).abs() < 1e-5);

    // Found only by the semantic mode: still present, scored by that term alone
    let c = "f002.md";
    assert!(!fts.contains_key(c));
    assert!(!graph.contains_key(c));
    assert!((scores(&hybrid)[c] - 0.4 * semantic[c]).abs() < 1e-5);
    let c_result = hybrid
        .results
        .iter()
        .find(|r| r.artifact.path == c)
        .unwrap();
    assert_eq!(c_result.matched_by, vec![SearchMode::Semantic]);

    assert_eq!(paths(&hybrid), vec![a, b, c]);
}

#[tokio::test]
async fn test_hybrid_min_score_drops_weak_single_mode_hits() {
    let store = create_store();
    seed_features(&store);
    let searcher = Searcher::new(store).with_embedding_provider(Arc::new(KeywordEmbedder));

    let options = SearchOptions::new(SearchMode::Hybrid)
        .with_feature("F001")
        .with_min_score(0.5);
    let response = searcher.search("login", &options).await.unwrap();
    assert_eq!(paths(&response), vec!["f001-a.md", "f001-b.md"]);
}

#[tokio::test]
async fn test_index_then_semantic_search() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("login.md"), "# Login\nHow login works").unwrap();
    fs::write(tmp.path().join("billing.md"), "# Billing\nInvoices").unwrap();

    let store = create_store();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(KeywordEmbedder);
    Indexer::new(store.clone(), tmp.path())
        .with_embedding_provider(embedder.clone())
        .index_directory()
        .await
        .unwrap();

    let searcher = Searcher::new(store).with_embedding_provider(embedder);
    let response = searcher
        .search("billing", &SearchOptions::new(SearchMode::Semantic))
        .await
        .unwrap();
    assert_eq!(response.total, 2);
    assert_eq!(response.results[0].artifact.path, "billing.md");
    assert!((response.results[0].score - 1.0).abs() < 1e-6);
}
