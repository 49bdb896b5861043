//! Cross-Platform Path Utilities
//!
//! Functions for resolving the engine's data directory and normalizing
//! logical artifact paths.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the memory data directory (~/.cascade-memory/)
pub fn memory_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".cascade-memory"))
}

/// Get the default database file path (~/.cascade-memory/memory.db)
pub fn default_database_path() -> AppResult<PathBuf> {
    Ok(memory_dir()?.join("memory.db"))
}

/// Get the default config file path (~/.cascade-memory/config.json)
pub fn default_config_path() -> AppResult<PathBuf> {
    Ok(memory_dir()?.join("config.json"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| {
            AppError::config(format!("Failed to create directory {}: {}", path.display(), e))
        })?;
    }
    Ok(())
}

/// Render `path` relative to `root` with `/` separators.
///
/// Falls back to the full path when `path` is not under `root`.
pub fn logical_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}
