//! Incremental Document Indexer
//!
//! Walks a document tree and upserts every matching file into the artifact
//! store, skipping files whose content hash has not changed since the last
//! run. A file that cannot be read or decoded is counted and skipped; it
//! never stops the walk.
//!
//! Indexing needs a Tokio runtime: per-file work is moved onto the blocking
//! pool with `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cascade_memory_core::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::models::artifact::{artifact_types, content_hash, Artifact};
use crate::services::memory::frontmatter::parse_document;
use crate::services::memory::store::ArtifactStore;
use crate::storage::config::MemoryConfig;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::logical_path;

/// Extensions classified as prose; everything else indexes as `code`.
const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "mdx", "txt", "rst"];

/// Counters for one indexing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_files: usize,
    /// New paths
    pub indexed: usize,
    /// Known paths whose content changed
    pub updated: usize,
    /// Known paths with unchanged content (no write)
    pub skipped: usize,
    /// Files that could not be read or decoded
    pub errors: usize,
}

enum FileOutcome {
    Indexed,
    Updated,
    Skipped,
    Failed(String),
}

/// Indexes one document root into an [`ArtifactStore`].
pub struct Indexer {
    store: Arc<ArtifactStore>,
    root: PathBuf,
    extensions: Vec<String>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl Indexer {
    pub fn new(store: Arc<ArtifactStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            root: root.into(),
            extensions: vec!["md".to_string()],
            embedder: None,
        }
    }

    /// Build from `docs_root` and `doc_extensions` of the config.
    pub fn from_config(store: Arc<ArtifactStore>, config: &MemoryConfig) -> AppResult<Self> {
        let root = config
            .docs_root
            .clone()
            .ok_or_else(|| AppError::config("docs_root is not configured"))?;
        Ok(Self::new(store, root).with_extensions(config.doc_extensions.clone()))
    }

    /// Only index files with these extensions (without the dot, case-insensitive)
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Embed every new or changed document with `provider`
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn index_directory(&self) -> AppResult<IndexStats> {
        self.run(None).await
    }

    /// Like [`index_directory`](Self::index_directory), checking the token
    /// before every file.
    pub async fn index_directory_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> AppResult<IndexStats> {
        self.run(Some(cancel)).await
    }

    async fn run(&self, cancel: Option<&CancellationToken>) -> AppResult<IndexStats> {
        if !self.root.is_dir() {
            return Err(AppError::not_found(format!(
                "Document root does not exist: {}",
                self.root.display()
            )));
        }

        let (files, walk_errors) = self.collect_files();
        let mut stats = IndexStats {
            total_files: files.len(),
            errors: walk_errors,
            ..IndexStats::default()
        };

        for path in &files {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                tracing::info!(root = %self.root.display(), ?stats, "Indexing cancelled");
                return Err(AppError::cancelled(format!(
                    "indexing of {} cancelled",
                    self.root.display()
                )));
            }

            match self.index_file(path).await? {
                FileOutcome::Indexed => stats.indexed += 1,
                FileOutcome::Updated => stats.updated += 1,
                FileOutcome::Skipped => stats.skipped += 1,
                FileOutcome::Failed(reason) => {
                    tracing::warn!(path = %path.display(), error = %reason, "Failed to index file");
                    stats.errors += 1;
                }
            }
        }

        tracing::info!(
            root = %self.root.display(),
            total = stats.total_files,
            indexed = stats.indexed,
            updated = stats.updated,
            skipped = stats.skipped,
            errors = stats.errors,
            "Indexing complete"
        );
        Ok(stats)
    }

    /// Matching files under the root in sorted order, plus the number of
    /// walk entries that could not be read.
    fn collect_files(&self) -> (Vec<PathBuf>, usize) {
        let walker = ignore::WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .build();

        let mut files = Vec::new();
        let mut errors = 0;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read directory entry");
                    errors += 1;
                    continue;
                }
            };
            if entry.file_type().map_or(true, |ft| !ft.is_file()) {
                continue;
            }
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if self.extensions.contains(&ext) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        (files, errors)
    }

    /// File I/O, hashing and store access run on the blocking pool; only
    /// the embedding call stays on the async executor.
    async fn index_file(&self, path: &Path) -> AppResult<FileOutcome> {
        let store = Arc::clone(&self.store);
        let root = self.root.clone();
        let owned = path.to_path_buf();
        let prepared = tokio::task::spawn_blocking(move || prepare_file(&store, &root, &owned))
            .await
            .map_err(|e| AppError::internal(format!("Indexing task join error: {}", e)))??;

        let (mut artifact, existed) = match prepared {
            Prepared::Done(outcome) => return Ok(outcome),
            Prepared::Pending { artifact, existed } => (artifact, existed),
        };

        if let Some(embedder) = &self.embedder {
            let text = format!("{}\n{}", artifact.title, artifact.content);
            match embedder.embed(&text).await {
                Ok(vector) if !vector.is_empty() => artifact.embedding = Some(vector),
                Ok(_) => {
                    tracing::warn!(path = %artifact.path, "Embedding provider returned an empty vector");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %artifact.path,
                        provider = embedder.name(),
                        error = %e,
                        "Embedding failed, storing artifact without one"
                    );
                }
            }
        }

        let store = Arc::clone(&self.store);
        let artifact = tokio::task::spawn_blocking(move || store.save(&artifact).map(|_| artifact))
            .await
            .map_err(|e| AppError::internal(format!("Indexing task join error: {}", e)))??;

        if existed {
            tracing::debug!(path = %artifact.path, id = %artifact.id, "Updated artifact");
            Ok(FileOutcome::Updated)
        } else {
            tracing::debug!(path = %artifact.path, id = %artifact.id, "Indexed artifact");
            Ok(FileOutcome::Indexed)
        }
    }
}

enum Prepared {
    Done(FileOutcome),
    Pending { artifact: Artifact, existed: bool },
}

/// Read, hash and parse one file; blocking.
fn prepare_file(store: &ArtifactStore, root: &Path, path: &Path) -> AppResult<Prepared> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => return Ok(Prepared::Done(FileOutcome::Failed(e.to_string()))),
    };
    let hash = content_hash(&bytes);
    let logical = logical_path(root, path);

    let existing = store.get_by_path(&logical)?;
    if existing.as_ref().is_some_and(|a| a.file_hash == hash) {
        tracing::debug!(path = %logical, "Unchanged, skipping");
        return Ok(Prepared::Done(FileOutcome::Skipped));
    }

    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(e) => {
            return Ok(Prepared::Done(FileOutcome::Failed(format!(
                "not valid UTF-8: {}",
                e
            ))))
        }
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| logical.clone());
    let parsed = parse_document(&content, &file_name);
    let meta = parsed.metadata;

    let mut artifact = Artifact::new(
        logical.as_str(),
        artifact_type_for(path),
        meta.title,
        parsed.body,
    )
    .with_tags(meta.tags)
    .with_file_hash(hash);
    artifact.feature_id = meta.feature_id;
    artifact.workstream_id = meta.workstream_id;

    Ok(Prepared::Pending {
        artifact,
        existed: existing.is_some(),
    })
}

fn artifact_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if DOC_EXTENSIONS.contains(&ext.as_str()) {
        artifact_types::DOC
    } else {
        artifact_types::CODE
    }
}
