//! File utility functions

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tabpreview::UploadPayload;

/// Expand a path string to an absolute path.
///
/// Handles `~` and `~/path` (home directory), relative paths (joined onto
/// the current directory, not canonicalized) and absolute paths, which pass
/// through unchanged. An empty string yields the current directory.
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();

    if path.is_empty() {
        return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    let expanded = if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
    } else if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    };

    if expanded.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    } else {
        expanded
    }
}

/// Read a local file into an upload payload named after its last component
pub fn read_upload(path: &Path) -> Result<UploadPayload> {
    let resolved = expand_path(&path.to_string_lossy());
    if !resolved.is_file() {
        anyhow::bail!("File not found: {}", resolved.display());
    }

    let file_name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Path has no file name: {}", resolved.display()))?;
    let bytes = std::fs::read(&resolved)
        .with_context(|| format!("Failed to read file: {}", resolved.display()))?;

    tracing::debug!(file = %resolved.display(), size = bytes.len(), "Read upload file");
    Ok(UploadPayload::new(file_name, bytes))
}
