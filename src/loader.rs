//! Document loading: paths or a manifest file → [`DocumentRecord`]s.
//!
//! Directories are walked recursively in sorted order for deterministic
//! output. Hidden files (`.` prefix) and Office lock/temp files (`~`
//! prefix) are skipped, as is any extension the extraction registry does
//! not support. A file that extracts to nothing is skipped with a
//! warning; a single bad file never fails the whole load.

use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{EngineError, Result};
use crate::extract::ExtractorRegistry;
use crate::models::DocumentRecord;

/// Length of the truncated content hash attached to each document.
const CONTENT_HASH_LEN: usize = 12;

/// Short content hash: SHA-256 hex, truncated.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..CONTENT_HASH_LEN].to_string()
}

/// Load documents from a list of file or folder paths.
///
/// Nonexistent paths are warned about and skipped — per-path problems
/// never abort the batch.
pub fn load_paths(registry: &ExtractorRegistry, paths: &[PathBuf]) -> Result<Vec<DocumentRecord>> {
    let mut docs = Vec::new();

    for path in paths {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "path not found, skipping");
            continue;
        }

        if path.is_file() {
            if let Some(doc) = load_file(registry, path) {
                docs.push(doc);
            }
            continue;
        }

        // Sorted walk for deterministic document order.
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "walk error, skipping entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(doc) = load_file(registry, entry.path()) {
                docs.push(doc);
            }
        }
    }

    tracing::info!(documents = docs.len(), "load complete");
    Ok(docs)
}

/// Load documents from a manifest file: one path per line, blank lines
/// and lines starting with `#` ignored.
///
/// A missing manifest is a [`EngineError::NotFound`]; a manifest that
/// yields zero usable paths is a configuration error.
pub fn load_manifest(registry: &ExtractorRegistry, manifest: &Path) -> Result<Vec<DocumentRecord>> {
    if !manifest.exists() {
        return Err(EngineError::NotFound(format!(
            "manifest file {}",
            manifest.display()
        )));
    }

    let content = std::fs::read_to_string(manifest)?;
    let paths: Vec<PathBuf> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect();

    if paths.is_empty() {
        return Err(EngineError::Config(format!(
            "no usable paths in {}",
            manifest.display()
        )));
    }

    tracing::info!(paths = paths.len(), manifest = %manifest.display(), "manifest loaded");
    load_paths(registry, &paths)
}

/// Process one file. Returns `None` when the file is skipped for any of
/// the per-file reasons (unsupported, hidden, empty extraction).
fn load_file(registry: &ExtractorRegistry, path: &Path) -> Option<DocumentRecord> {
    let filename = path.file_name()?.to_string_lossy().into_owned();

    // Hidden files and Office lock/temp files.
    if filename.starts_with('.') || filename.starts_with('~') {
        return None;
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !registry.supports(&ext) {
        return None;
    }

    let text = registry.extract_file(path);
    let text = text.trim();
    if text.is_empty() {
        tracing::warn!(file = %filename, "no text extracted, skipping");
        return None;
    }

    let modified = file_modified(path);
    let record = DocumentRecord {
        filename: filename.clone(),
        filepath: path.to_path_buf(),
        source_dir: path.parent().unwrap_or(Path::new("")).to_path_buf(),
        content_hash: content_hash(text),
        size: text.len(),
        text: text.to_string(),
        modified,
    };
    tracing::info!(file = %filename, chars = record.size, "loaded");
    Some(record)
}

fn file_modified(path: &Path) -> DateTime<Utc> {
    let secs = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}
