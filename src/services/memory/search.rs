//! Multi-Mode Search
//!
//! Four retrieval strategies over the artifact store:
//!
//! - **fts**: lexical search, rescored onto [0, 1] from title, content and
//!   feature hits
//! - **semantic**: cosine similarity between the query embedding and every
//!   stored embedding
//! - **graph**: artifacts related to a feature, scored `1 / (rank + 1)`
//! - **hybrid**: weighted sum of the three per artifact ID
//!
//! Semantic search without a usable embedding provider, and graph search
//! without a feature filter, fall back to fts. Fallbacks are logged and
//! reported through `degraded`, never returned as errors.
//!
//! ## Deterministic Tie-Breaking
//!
//! Results with equal scores are sorted by path ascending.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cascade_memory_core::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::models::artifact::Artifact;
use crate::services::memory::graph::Graph;
use crate::services::memory::store::ArtifactStore;
use crate::storage::config::SearchConfig;
use crate::utils::error::{AppError, AppResult};

const TITLE_WEIGHT: f32 = 0.5;
const CONTENT_WEIGHT: f32 = 0.3;
const FEATURE_WEIGHT: f32 = 0.2;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Fts,
    Semantic,
    Graph,
    #[default]
    Hybrid,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::Fts => write!(f, "fts"),
            SearchMode::Semantic => write!(f, "semantic"),
            SearchMode::Graph => write!(f, "graph"),
            SearchMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fts" | "full_text" | "fulltext" => Ok(SearchMode::Fts),
            "semantic" => Ok(SearchMode::Semantic),
            "graph" => Ok(SearchMode::Graph),
            "hybrid" => Ok(SearchMode::Hybrid),
            _ => Err(format!("Unknown search mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub mode: SearchMode,
    /// Falls back to `SearchConfig::default_limit` when unset or zero
    pub limit: Option<usize>,
    /// Enables graph scoring and the feature-match bonus
    pub feature_id: Option<String>,
    pub min_score: Option<f32>,
}

impl SearchOptions {
    pub fn new(mode: SearchMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_feature(mut self, feature_id: impl Into<String>) -> Self {
        self.feature_id = Some(feature_id.into());
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub artifact: Artifact,
    pub score: f32,
    /// Modes that found this artifact
    pub matched_by: Vec<SearchMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// Result count before truncation to the limit
    pub total: usize,
    pub elapsed: Duration,
    /// `true` when a requested strategy fell back to fts
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

/// Output of one strategy: scored hits, or the reason it could not run.
enum Channel {
    Hits(Vec<(Artifact, f32)>),
    Degraded(String),
}

// ---------------------------------------------------------------------------
// Searcher
// ---------------------------------------------------------------------------

pub struct Searcher {
    store: Arc<ArtifactStore>,
    graph: Graph,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: SearchConfig,
}

impl Searcher {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self {
            graph: Graph::new(store.clone()),
            store,
            embedder: None,
            config: SearchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> AppResult<SearchResponse> {
        self.search_inner(query, options, None).await
    }

    /// Like [`search`](Self::search), checking the token between strategies.
    pub async fn search_with_cancel(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> AppResult<SearchResponse> {
        self.search_inner(query, options, Some(cancel)).await
    }

    async fn search_inner(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: Option<&CancellationToken>,
    ) -> AppResult<SearchResponse> {
        let started = Instant::now();
        check_cancelled(cancel)?;

        let feature = options
            .feature_id
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());
        let mut degraded_reason: Option<String> = None;

        let merged: Vec<SearchResult> = match options.mode {
            SearchMode::Fts => single_mode(self.fts_channel(query, feature)?, SearchMode::Fts),
            SearchMode::Semantic => match self.semantic_channel(query).await? {
                Channel::Hits(hits) => single_mode(hits, SearchMode::Semantic),
                Channel::Degraded(reason) => {
                    tracing::warn!(reason = %reason, "Semantic search unavailable, falling back to fts");
                    check_cancelled(cancel)?;
                    degraded_reason = Some(reason);
                    single_mode(self.fts_channel(query, feature)?, SearchMode::Fts)
                }
            },
            SearchMode::Graph => match self.graph_channel(feature)? {
                Channel::Hits(hits) => single_mode(hits, SearchMode::Graph),
                Channel::Degraded(reason) => {
                    tracing::warn!(reason = %reason, "Graph search unavailable, falling back to fts");
                    degraded_reason = Some(reason);
                    single_mode(self.fts_channel(query, feature)?, SearchMode::Fts)
                }
            },
            SearchMode::Hybrid => {
                let (results, reason) = self.hybrid(query, feature, cancel).await?;
                degraded_reason = reason;
                results
            }
        };

        let mut results: Vec<SearchResult> = match options.min_score {
            Some(min) => merged.into_iter().filter(|r| r.score >= min).collect(),
            None => merged,
        };
        sort_results(&mut results);

        let total = results.len();
        let limit = options
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(self.config.default_limit);
        results.truncate(limit);

        let elapsed = started.elapsed();
        tracing::debug!(
            mode = %options.mode,
            total,
            returned = results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Search complete"
        );

        Ok(SearchResponse {
            results,
            total,
            elapsed,
            degraded: degraded_reason.is_some(),
            degraded_reason,
        })
    }

    async fn hybrid(
        &self,
        query: &str,
        feature: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> AppResult<(Vec<SearchResult>, Option<String>)> {
        let mut merged: HashMap<String, SearchResult> = HashMap::new();
        let mut add = |hits: Vec<(Artifact, f32)>, weight: f32, mode: Option<SearchMode>| {
            for (artifact, score) in hits {
                let entry = merged
                    .entry(artifact.id.clone())
                    .or_insert_with(|| SearchResult {
                        artifact,
                        score: 0.0,
                        matched_by: Vec::new(),
                    });
                entry.score += weight * score;
                if let Some(mode) = mode {
                    if !entry.matched_by.contains(&mode) {
                        entry.matched_by.push(mode);
                    }
                }
            }
        };

        let fts_hits = self.fts_channel(query, feature)?;
        check_cancelled(cancel)?;

        let mut degraded_reason = None;
        match self.semantic_channel(query).await? {
            Channel::Hits(hits) => add(hits, self.config.semantic_weight, Some(SearchMode::Semantic)),
            Channel::Degraded(reason) => {
                // The semantic term is the fts fallback, as in semantic mode
                tracing::warn!(reason = %reason, "Semantic channel degraded to fts in hybrid search");
                add(fts_hits.clone(), self.config.semantic_weight, None);
                degraded_reason = Some(reason);
            }
        }
        add(fts_hits, self.config.fts_weight, Some(SearchMode::Fts));
        check_cancelled(cancel)?;

        if feature.is_some() {
            if let Channel::Hits(hits) = self.graph_channel(feature)? {
                add(hits, self.config.graph_weight, Some(SearchMode::Graph));
            }
        }

        Ok((merged.into_values().collect(), degraded_reason))
    }

    // -----------------------------------------------------------------------
    // Channels
    // -----------------------------------------------------------------------

    fn fts_channel(&self, query: &str, feature: Option<&str>) -> AppResult<Vec<(Artifact, f32)>> {
        let feature_key = feature.or_else(|| Some(query.trim()).filter(|q| !q.is_empty()));
        Ok(self
            .store
            .search(query)?
            .into_iter()
            .map(|artifact| {
                let score = fts_score(&artifact, query, feature_key);
                (artifact, score)
            })
            .collect())
    }

    async fn semantic_channel(&self, query: &str) -> AppResult<Channel> {
        let Some(embedder) = &self.embedder else {
            return Ok(Channel::Degraded("no embedding provider configured".to_string()));
        };

        let query_vector = match embedder.embed(query).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => {
                return Ok(Channel::Degraded(format!(
                    "embedding provider '{}' returned an empty vector",
                    embedder.name()
                )))
            }
            Err(e) => {
                return Ok(Channel::Degraded(format!(
                    "embedding provider '{}' failed: {}",
                    embedder.name(),
                    e
                )))
            }
        };

        let mut skipped = 0usize;
        let mut hits = Vec::new();
        for artifact in self.store.list_with_embeddings()? {
            let similarity = match artifact.embedding.as_deref() {
                Some(v) if v.len() == query_vector.len() => cosine_similarity(&query_vector, v),
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            hits.push((artifact, similarity));
        }
        if skipped > 0 {
            tracing::debug!(
                skipped,
                dimension = query_vector.len(),
                "Skipped artifacts with mismatched embedding dimension"
            );
        }
        Ok(Channel::Hits(hits))
    }

    fn graph_channel(&self, feature: Option<&str>) -> AppResult<Channel> {
        let Some(feature) = feature else {
            return Ok(Channel::Degraded("graph search requires a feature filter".to_string()));
        };
        let related = self.graph.find_related(feature, self.config.graph_depth.max(1))?;
        Ok(Channel::Hits(
            related
                .into_iter()
                .enumerate()
                .map(|(rank, artifact)| (artifact, 1.0 / (rank as f32 + 1.0)))
                .collect(),
        ))
    }
}

impl std::fmt::Debug for Searcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searcher")
            .field("config", &self.config)
            .field("embedder", &self.embedder.as_ref().map(|e| e.name().to_string()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Scoring helpers
// ---------------------------------------------------------------------------

/// Relevance of a lexical hit on a [0, 1] scale.
///
/// Title and content each contribute their weight times the match strength:
/// 1 when the whole query appears, otherwise the fraction of query tokens
/// that appear. The feature bonus applies when the artifact's feature ID
/// equals `feature_key`.
pub fn fts_score(artifact: &Artifact, query: &str, feature_key: Option<&str>) -> f32 {
    let mut score = TITLE_WEIGHT * match_strength(&artifact.title, query)
        + CONTENT_WEIGHT * match_strength(&artifact.content, query);
    if let (Some(key), Some(feature)) = (feature_key, artifact.feature_id.as_deref()) {
        if key == feature {
            score += FEATURE_WEIGHT;
        }
    }
    score.min(1.0)
}

fn match_strength(text: &str, query: &str) -> f32 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    if text.contains(&query) {
        return 1.0;
    }
    let tokens: Vec<&str> = query.split_whitespace().collect();
    let found = tokens.iter().filter(|t| text.contains(*t)).count();
    found as f32 / tokens.len() as f32
}

/// Cosine similarity in [-1, 1]; 0 for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}

fn single_mode(hits: Vec<(Artifact, f32)>, mode: SearchMode) -> Vec<SearchResult> {
    hits.into_iter()
        .map(|(artifact, score)| SearchResult {
            artifact,
            score,
            matched_by: vec![mode],
        })
        .collect()
}

fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.artifact.path.cmp(&b.artifact.path))
    });
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> AppResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(AppError::cancelled("search cancelled")),
        _ => Ok(()),
    }
}
