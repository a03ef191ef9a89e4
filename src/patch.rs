// src/patch.rs

//! Unified-diff application for installed distributions
//!
//! Patch files come from hooks and are applied in order, rooted at the
//! distribution's install path. Diagnostics from an application are kept in
//! a buffer and only logged when that application fails, so successful runs
//! stay quiet.

use crate::cleanup::validate_path;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Debug lines collected while applying one patch file
#[derive(Debug, Default)]
struct Diagnostics {
    lines: Vec<String>,
}

impl Diagnostics {
    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn flush(&mut self) {
        for line in self.lines.drain(..) {
            debug!("patch: {}", line);
        }
    }
}

/// One file section of a multi-file unified diff
#[derive(Debug)]
struct FilePatch {
    /// `---` header path, `None` for `/dev/null`
    original: Option<String>,
    /// `+++` header path, `None` for `/dev/null`
    modified: Option<String>,
    text: String,
}

fn header_path(line: &str, prefix: &str) -> Option<String> {
    let rest = line.strip_prefix(prefix)?;
    let path = rest.split('\t').next().unwrap_or(rest).trim_end();
    if path == "/dev/null" {
        None
    } else {
        Some(path.to_string())
    }
}

fn is_hunk_line(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("@@")
        || line.starts_with(' ')
        || line.starts_with('+')
        || line.starts_with('-')
        || line.starts_with('\\')
}

/// Split patch text into per-file sections, dropping preamble lines
/// (`diff --git`, `index ...`) between them
fn split_file_patches(text: &str) -> Vec<FilePatch> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut patches = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let is_header = lines[i].starts_with("--- ")
            && lines.get(i + 1).is_some_and(|next| next.starts_with("+++ "));
        if !is_header {
            i += 1;
            continue;
        }

        let original = header_path(lines[i].trim_end_matches(['\n', '\r']), "--- ");
        let modified = header_path(lines[i + 1].trim_end_matches(['\n', '\r']), "+++ ");
        let mut body = String::new();
        body.push_str(lines[i]);
        body.push_str(lines[i + 1]);
        i += 2;

        while i < lines.len() {
            let line = lines[i].trim_end_matches(['\n', '\r']);
            let next_is_header = line.starts_with("--- ")
                && lines.get(i + 1).is_some_and(|next| next.starts_with("+++ "));
            if next_is_header || !is_hunk_line(line) {
                break;
            }
            body.push_str(lines[i]);
            i += 1;
        }

        patches.push(FilePatch {
            original,
            modified,
            text: body,
        });
    }

    patches
}

/// Reject header paths that are absolute or climb out with `..`
fn check_header(header: &str) -> Result<()> {
    let escapes = Path::new(header)
        .components()
        .any(|c| matches!(c, Component::RootDir | Component::Prefix(_) | Component::ParentDir));
    if escapes {
        return Err(Error::PatchError(format!("Unsafe path in diff header: {}", header)));
    }
    Ok(())
}

/// Find the file a header path refers to under `root`
///
/// Tries the path as written, then with its first component stripped
/// (`a/foo.py` → `foo.py`). The result must lie strictly inside `root`.
fn locate(root: &Path, header: &str) -> Result<PathBuf> {
    check_header(header)?;
    let direct = root.join(header);
    let stripped: PathBuf = Path::new(header).components().skip(1).collect();
    let candidate = root.join(&stripped);
    let target = if direct.exists() {
        direct
    } else if !stripped.as_os_str().is_empty()
        && (candidate.exists() || candidate.parent().is_some_and(Path::exists))
    {
        candidate
    } else {
        direct
    };

    validate_path(&target, root).map_err(|_| {
        Error::PatchError(format!(
            "{} resolves outside {}",
            header,
            root.display()
        ))
    })
}

fn apply_file_patch(file_patch: &FilePatch, root: &Path, diag: &mut Diagnostics) -> Result<()> {
    let parsed = diffy::Patch::from_str(&file_patch.text)
        .map_err(|e| Error::PatchError(format!("Malformed diff section: {}", e)))?;

    match (&file_patch.original, &file_patch.modified) {
        (None, None) => Err(Error::PatchError("Diff section without file names".to_string())),
        (Some(original), None) => {
            let target = locate(root, original)?;
            diag.push(format!("deleting {}", target.display()));
            fs::remove_file(&target).map_err(|e| {
                Error::PatchError(format!("Cannot delete {}: {}", target.display(), e))
            })
        }
        (original, Some(modified)) => {
            let target = locate(root, original.as_deref().unwrap_or(modified))?;
            let patched = if original.is_some() {
                let base = fs::read_to_string(&target).map_err(|e| {
                    Error::PatchError(format!("Cannot read {}: {}", target.display(), e))
                })?;
                diag.push(format!("applying {} hunks to {}", parsed.hunks().len(), target.display()));
                diffy::apply(&base, &parsed).map_err(|e| {
                    Error::PatchError(format!("Hunk failed on {}: {}", target.display(), e))
                })?
            } else {
                diag.push(format!("creating {}", target.display()));
                parsed
                    .hunks()
                    .iter()
                    .flat_map(|hunk| hunk.lines())
                    .filter_map(|line| match line {
                        diffy::Line::Insert(text) => Some(*text),
                        _ => None,
                    })
                    .collect::<String>()
            };

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, patched)?;
            Ok(())
        }
    }
}

/// Apply one patch file rooted at `root`
pub fn apply_patch_file(patch: &Path, root: &Path) -> Result<()> {
    if !patch.is_absolute() {
        return Err(Error::PatchError(format!("{} is not an absolute path", patch.display())));
    }
    if !patch.exists() {
        return Err(Error::PatchError(format!("Patch at {} does not exist", patch.display())));
    }

    let text = fs::read_to_string(patch)?;
    let mut diag = Diagnostics::default();
    let sections = split_file_patches(&text);
    diag.push(format!("{} file sections in {}", sections.len(), patch.display()));

    let result = if sections.is_empty() {
        Err(Error::PatchError(format!("No file sections found in {}", patch.display())))
    } else {
        sections
            .iter()
            .flat_map(|section| section.original.iter().chain(section.modified.iter()))
            .try_for_each(|header| check_header(header))
            .and_then(|()| {
                sections
                    .iter()
                    .try_for_each(|section| apply_file_patch(section, root, &mut diag))
            })
    };

    result.map_err(|e| {
        diag.flush();
        Error::PatchError(format!(
            "Failed to apply patch {} on {}: {}",
            patch.display(),
            root.display(),
            e
        ))
    })
}

/// Apply patches in order, stopping at the first failure
pub fn apply_patches(name: &str, patches: &[PathBuf], root: &Path) -> Result<()> {
    if patches.is_empty() {
        debug!("No patches for {}", name);
        return Ok(());
    }

    info!("Applying {} patches for {} at {}", patches.len(), name, root.display());
    for patch in patches {
        info!("Applying patch {}", patch.display());
        apply_patch_file(patch, root)?;
    }
    Ok(())
}
