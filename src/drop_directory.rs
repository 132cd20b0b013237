//! Where the Bluetooth stack drops received files

use std::path::{Path, PathBuf};

use crate::config::{AppConfig, KEY_DROP_DIRECTORY};

/// Platform defaults, most likely first
pub fn default_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join("bluetooth"));
    }
    if let Some(downloads) = dirs::download_dir() {
        candidates.push(downloads.join("Bluetooth"));
    }
    candidates
}

/// Explicit path, then the persisted preference, then the first existing
/// candidate, then the last candidate.
pub fn resolve_drop_directory(
    explicit: Option<&Path>,
    config: &AppConfig,
    candidates: &[PathBuf],
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    match config.get(KEY_DROP_DIRECTORY) {
        Ok(Some(saved)) if !saved.trim().is_empty() => return Some(PathBuf::from(saved.trim())),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Could not read saved drop directory"),
    }

    candidates
        .iter()
        .find(|c| c.is_dir())
        .or_else(|| candidates.last())
        .cloned()
}
