//! JSON Configuration Management
//!
//! Reading, validating and writing the memory engine configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::services::memory::tiering::TierPolicy;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{default_config_path, default_database_path, ensure_dir};

/// Ranking knobs for the searcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result limit used when a request does not set one
    pub default_limit: usize,
    pub fts_weight: f32,
    pub semantic_weight: f32,
    pub graph_weight: f32,
    /// Depth passed to `Graph::find_related` in graph and hybrid mode
    pub graph_depth: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            fts_weight: 0.4,
            semantic_weight: 0.4,
            graph_weight: 0.2,
            graph_depth: 1,
        }
    }
}

/// Top-level configuration for the memory engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Database file; `None` resolves to `~/.cascade-memory/memory.db`
    pub database_path: Option<PathBuf>,
    /// Root of the document tree walked by the indexer
    pub docs_root: Option<PathBuf>,
    /// File extensions (without dot) the indexer picks up
    pub doc_extensions: Vec<String>,
    /// Store embeddings as int8 + scale instead of f32
    pub quantize_embeddings: bool,
    pub search: SearchConfig,
    pub tier_policy: TierPolicy,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            docs_root: None,
            doc_extensions: vec!["md".to_string()],
            quantize_embeddings: false,
            search: SearchConfig::default(),
            tier_policy: TierPolicy::default(),
        }
    }
}

impl MemoryConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: MemoryConfig = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Load configuration, writing the defaults first if the file is missing
    pub fn load_or_default(path: &Path) -> AppResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Load the per-user config (~/.cascade-memory/config.json)
    pub fn load_user() -> AppResult<Self> {
        Self::load_or_default(&default_config_path()?)
    }

    /// Save configuration to a file with pretty formatting
    pub fn save(&self, path: &Path) -> AppResult<()> {
        self.validate().map_err(AppError::validation)?;
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the database path, falling back to the per-user default
    pub fn resolved_database_path(&self) -> AppResult<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => default_database_path(),
        }
    }

    /// Check invariants the rest of the engine relies on
    pub fn validate(&self) -> Result<(), String> {
        if self.doc_extensions.is_empty() {
            return Err("doc_extensions must not be empty".to_string());
        }
        if self.search.default_limit == 0 {
            return Err("search.default_limit must be positive".to_string());
        }
        let weights = [
            self.search.fts_weight,
            self.search.semantic_weight,
            self.search.graph_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("search weights must be finite and non-negative".to_string());
        }
        self.tier_policy.validate()
    }
}
