//! Stored path normalization
//!
//! Paths may have been persisted with either separator style, so every path
//! leaving the service is rewritten to forward slashes.

use std::path::Path;

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn normalize_paths<S: AsRef<str>>(paths: &[S]) -> Vec<String> {
    paths.iter().map(|p| normalize_path(p.as_ref())).collect()
}

/// Render a filesystem path for storage or output.
pub fn path_to_string(path: &Path) -> String {
    normalize_path(&path.to_string_lossy())
}
