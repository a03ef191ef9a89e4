// src/cleanup.rs

//! Post-install cleanup actions
//!
//! Hooks never touch the filesystem themselves during cleanup; they return
//! [`CleanupAction`]s. All actions for a distribution are validated against
//! the install root before the first one executes, so an action escaping the
//! root aborts the run with nothing removed.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Kind of cleanup operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOperation {
    /// Remove a file, symlink or directory tree
    Remove,
}

/// A filesystem mutation requested by a hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupAction {
    pub operation: CleanupOperation,
    pub path: PathBuf,
}

impl CleanupAction {
    pub fn remove(path: impl Into<PathBuf>) -> Self {
        Self {
            operation: CleanupOperation::Remove,
            path: path.into(),
        }
    }
}

/// Normalize `.` and `..` components without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Check that `path` lies strictly inside `root`
///
/// Relative paths are taken relative to `root`. Beyond the lexical check,
/// the nearest existing ancestor is resolved so a symlinked directory inside
/// the root cannot redirect a removal elsewhere.
pub fn validate_path(path: &Path, root: &Path) -> Result<PathBuf> {
    let reject = || Error::CleanupSecurityError {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    };

    let root = normalize(root);
    let resolved = normalize(&root.join(path));
    if resolved == root || !resolved.starts_with(&root) {
        return Err(reject());
    }

    if let Ok(real_root) = root.canonicalize() {
        let real_parent = resolved
            .parent()
            .and_then(|p| p.ancestors().find_map(|a| a.canonicalize().ok()));
        if let Some(real_parent) = real_parent {
            if !real_parent.starts_with(&real_root) {
                return Err(reject());
            }
        }
    }

    Ok(resolved)
}

/// Validate every action, then execute them in order
///
/// Returns the paths that were actually removed. Paths that do not exist are
/// skipped.
pub fn execute(actions: &[CleanupAction], root: &Path) -> Result<Vec<PathBuf>> {
    let resolved = actions
        .iter()
        .map(|action| validate_path(&action.path, root).map(|p| (action.operation, p)))
        .collect::<Result<Vec<_>>>()?;

    let mut removed = Vec::new();
    for (operation, path) in resolved {
        match operation {
            CleanupOperation::Remove => {
                let meta = match fs::symlink_metadata(&path) {
                    Ok(meta) => meta,
                    Err(_) => {
                        debug!("Cleanup target {} does not exist, skipping", path.display());
                        continue;
                    }
                };

                if meta.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
                debug!("Removed {}", path.display());
                removed.push(path);
            }
        }
    }

    Ok(removed)
}
