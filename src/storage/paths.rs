//! Logical path resolution rooted at the storage directory.

use std::path::{Path, PathBuf};

use crate::error::AppError;

use super::naming;

#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub absolute: PathBuf,
    pub logical: String,
}

impl ResolvedPath {
    pub fn is_root(&self) -> bool {
        self.logical.is_empty()
    }

    pub fn file_name(&self) -> &str {
        self.logical.rsplit('/').next().unwrap_or("")
    }
}

/// Maps a client-supplied `/`-separated path onto an absolute path under
/// `root`, along with its normalized logical form. Empty input resolves to
/// the root itself.
pub fn resolve(root: &Path, logical: &str) -> Result<ResolvedPath, AppError> {
    let mut absolute = root.to_path_buf();
    let mut segments: Vec<&str> = Vec::new();

    for segment in logical.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(AppError::InvalidPath(logical.to_string()));
        }
        if segment.chars().any(naming::is_illegal_segment_char) {
            return Err(AppError::InvalidPath(logical.to_string()));
        }
        absolute.push(segment);
        segments.push(segment);
    }

    Ok(ResolvedPath {
        absolute,
        logical: segments.join("/"),
    })
}

/// Joins a normalized logical path with one more segment.
pub fn join_logical(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
