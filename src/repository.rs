// src/repository.rs

//! Package repository boundary
//!
//! A [`PackageRepository`] owns the on-disk format of published packages.
//! The assembler hands it a [`TargetPackage`] and a callback that fills a
//! variant directory with files; the repository decides where that directory
//! lives and whether it needs filling at all.
//!
//! [`FilesystemRepository`] lays packages out as
//!
//! ```text
//! <root>/<name>/<version>/package.py
//! <root>/<name>/<version>/<sha256 of variant requirements>/...
//! ```
//!
//! and merges the variants of repeated publishes (one per interpreter, say)
//! into the same `package.py`.

use crate::assemble::TargetPackage;
use crate::error::{Error, Result};
use crate::hash::sha256;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of a publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub package_dir: PathBuf,
    /// Variant roots that were materialized
    pub installed: Vec<PathBuf>,
    /// Variant roots that already existed
    pub skipped: Vec<PathBuf>,
}

/// Destination for assembled packages
pub trait PackageRepository {
    /// Publish a package, calling `materialize` once per variant root that
    /// needs its files
    fn publish(
        &self,
        package: &TargetPackage,
        materialize: &mut dyn FnMut(&Path) -> Result<()>,
    ) -> Result<PublishReport>;
}

/// Directory name of a variant
///
/// Hashing the requirement list keeps names filesystem-safe whatever the
/// requirements contain.
pub fn variant_hash(requirements: &[String]) -> String {
    sha256(requirements.join("\n").as_bytes())
}

/// Repository rooted at a local directory
#[derive(Debug, Clone)]
pub struct FilesystemRepository {
    root: PathBuf,
}

impl FilesystemRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_dir(&self, package: &TargetPackage) -> PathBuf {
        self.root.join(&package.name).join(&package.version)
    }
}

impl PackageRepository for FilesystemRepository {
    fn publish(
        &self,
        package: &TargetPackage,
        materialize: &mut dyn FnMut(&Path) -> Result<()>,
    ) -> Result<PublishReport> {
        let package_dir = self.package_dir(package);
        let package_py = package_dir.join("package.py");
        fs::create_dir_all(&package_dir)?;

        let mut report = PublishReport {
            package_dir: package_dir.clone(),
            ..Default::default()
        };
        let mut variants = if package_py.exists() {
            existing_variants(&fs::read_to_string(&package_py)?)?
        } else {
            Vec::new()
        };

        if package.variant_requires.is_empty() {
            if package_py.exists() {
                debug!("{} already exists, skipping", package_py.display());
                report.skipped.push(package_dir.clone());
            } else {
                materialize(&package_dir)?;
                report.installed.push(package_dir.clone());
            }
        } else {
            let requirements: Vec<String> = package.variant_requires.iter().map(|r| r.to_string()).collect();
            let variant_dir = package_dir.join(variant_hash(&requirements));

            if variant_dir.exists() {
                info!(
                    "Variant [{}] of {}-{} already exists, skipping",
                    requirements.join(", "),
                    package.name,
                    package.version
                );
                report.skipped.push(variant_dir);
            } else {
                fs::create_dir_all(&variant_dir)?;
                if let Err(e) = materialize(&variant_dir) {
                    let _ = fs::remove_dir_all(&variant_dir);
                    return Err(e);
                }
                report.installed.push(variant_dir);
            }

            if !variants.contains(&requirements) {
                variants.push(requirements);
            }
        }

        if !report.installed.is_empty() {
            let temp = package_dir.join("package.py.tmp");
            fs::write(&temp, render_package_py(package, &variants)?)?;
            fs::rename(&temp, &package_py)?;
            info!("Wrote {}", package_py.display());
        }

        Ok(report)
    }
}

// =============================================================================
// package.py rendering
// =============================================================================

/// Render a JSON value as a Python literal
fn python_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(python_literal).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", quote(k), python_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Double-quoted string literal valid in both JSON and Python
fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn string_list(items: &[String]) -> String {
    format!("[{}]", items.iter().map(|s| quote(s)).collect::<Vec<_>>().join(", "))
}

/// Render `package.py`
pub fn render_package_py(package: &TargetPackage, variants: &[Vec<String>]) -> Result<String> {
    let mut out = String::from("# -*- coding: utf-8 -*-\n\n");
    out.push_str(&format!("name = {}\n\n", quote(&package.name)));
    out.push_str(&format!("version = {}\n\n", quote(&package.version)));

    let meta = &package.metadata;
    if let Some(summary) = &meta.summary {
        out.push_str(&format!("summary = {}\n\n", quote(summary)));
    }
    if let Some(description) = &meta.description {
        out.push_str(&format!("description = {}\n\n", quote(description)));
    }
    if !meta.authors.is_empty() {
        out.push_str(&format!("authors = {}\n\n", string_list(&meta.authors)));
    }
    if let Some(license) = &meta.license {
        out.push_str(&format!("license = {}\n\n", quote(license)));
    }
    if !meta.help.is_empty() {
        let links: Vec<String> = meta
            .help
            .iter()
            .map(|(label, url)| format!("[{}, {}]", quote(label), quote(url)))
            .collect();
        out.push_str(&format!("help = [{}]\n\n", links.join(", ")));
    }

    if !package.requires.is_empty() {
        out.push_str("requires = [\n");
        for req in &package.requires {
            out.push_str(&format!("    {},\n", quote(&req.to_string())));
        }
        out.push_str("]\n\n");
    }

    if !variants.is_empty() {
        out.push_str("variants = [\n");
        for variant in variants {
            out.push_str(&format!("    {},\n", string_list(variant)));
        }
        out.push_str("]\n\nhashed_variants = True\n\n");
    }

    if !package.tools.is_empty() {
        out.push_str(&format!("tools = {}\n\n", string_list(&package.tools)));
    }

    out.push_str("def commands():\n");
    for command in &package.commands {
        out.push_str(&format!("    {}\n", command));
    }
    out.push('\n');

    let provenance = serde_json::to_value(&package.provenance)
        .map_err(|e| Error::ParseError(format!("Cannot serialize provenance: {e}")))?;
    out.push_str(&format!("pip = {}\n", python_literal(&provenance)));

    Ok(out)
}

/// Variants listed in a `package.py` written by [`render_package_py`]
fn existing_variants(package_py: &str) -> Result<Vec<Vec<String>>> {
    let mut lines = package_py.lines().skip_while(|l| *l != "variants = [");
    if lines.next().is_none() {
        return Ok(Vec::new());
    }

    lines
        .take_while(|l| *l != "]")
        .map(|line| {
            let entry = line.trim().trim_end_matches(',');
            serde_json::from_str::<Vec<String>>(entry)
                .map_err(|e| Error::ParseError(format!("Unexpected variant line '{}': {e}", line)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{ConvertedMetadata, CopyEntry, Provenance};
    use crate::requirement::TargetRequirement;
    use tempfile::TempDir;

    fn package(variant: &[&str]) -> TargetPackage {
        TargetPackage {
            name: "demo".to_string(),
            version: "1.0".to_string(),
            metadata: ConvertedMetadata {
                summary: Some("Say \"hi\"".to_string()),
                authors: vec!["Jane".to_string()],
                help: vec![("Home-page".to_string(), "https://demo.example".to_string())],
                ..Default::default()
            },
            requires: vec![TargetRequirement::any("python")],
            variant_requires: variant
                .iter()
                .map(|v| {
                    let (name, value) = v.split_once('-').unwrap();
                    TargetRequirement::family(name, value).unwrap()
                })
                .collect(),
            tools: vec!["demo".to_string()],
            commands: vec![
                "env.PYTHONPATH.append('{root}/python')".to_string(),
                "env.PATH.append('{root}/scripts')".to_string(),
            ],
            is_pure: variant.is_empty(),
            provenance: Provenance {
                name: "demo".to_string(),
                version: "1.0".to_string(),
                is_pure_python: variant.is_empty(),
                wheel_urls: vec!["https://files.example/demo-1.0-py3-none-any.whl".to_string()],
                rezpip_version: "0.1.0".to_string(),
                metadata: serde_json::Map::from_iter([("keywords".to_string(), serde_json::json!(["a", null]))]),
            },
            copy_plan: Vec::<CopyEntry>::new(),
        }
    }

    #[test]
    fn test_python_literal() {
        let value = serde_json::json!({"a": [true, false, null, 1, "x\"y"]});
        assert_eq!(python_literal(&value), r#"{"a": [True, False, None, 1, "x\"y"]}"#);
    }

    #[test]
    fn test_render_and_reparse_variants() {
        let pkg = package(&["platform-linux", "python-3.11"]);
        let variants = vec![vec!["platform-linux".to_string(), "python-3.11".to_string()]];
        let text = render_package_py(&pkg, &variants).unwrap();

        assert!(text.contains("name = \"demo\"\n"));
        assert!(text.contains("summary = \"Say \\\"hi\\\"\"\n"));
        assert!(text.contains("help = [[\"Home-page\", \"https://demo.example\"]]\n"));
        assert!(text.contains("hashed_variants = True\n"));
        assert!(text.contains("def commands():\n    env.PYTHONPATH.append('{root}/python')\n"));
        assert!(text.contains("\"is_pure_python\": False"));
        assert_eq!(existing_variants(&text).unwrap(), variants);
        assert!(existing_variants("name = \"x\"\n").unwrap().is_empty());
    }

    #[test]
    fn test_publish_is_idempotent_and_merges_variants() {
        let dir = TempDir::new().unwrap();
        let repo = FilesystemRepository::new(dir.path());
        let mut calls = Vec::new();
        let mut materialize = |root: &Path| -> Result<()> {
            fs::write(root.join("marker"), "x")?;
            calls.push(root.to_path_buf());
            Ok(())
        };

        let py311 = package(&["platform-linux", "python-3.11"]);
        let report = repo.publish(&py311, &mut materialize).unwrap();
        assert_eq!(report.installed.len(), 1);
        let expected_dir = dir
            .path()
            .join("demo/1.0")
            .join(variant_hash(&["platform-linux".to_string(), "python-3.11".to_string()]));
        assert_eq!(report.installed[0], expected_dir);
        assert!(expected_dir.join("marker").is_file());

        let again = repo.publish(&py311, &mut materialize).unwrap();
        assert!(again.installed.is_empty());
        assert_eq!(again.skipped, vec![expected_dir]);

        let py310 = package(&["platform-linux", "python-3.10"]);
        repo.publish(&py310, &mut materialize).unwrap();
        let text = fs::read_to_string(dir.path().join("demo/1.0/package.py")).unwrap();
        assert_eq!(existing_variants(&text).unwrap().len(), 2);
        drop(materialize);
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn test_publish_without_variants() {
        let dir = TempDir::new().unwrap();
        let repo = FilesystemRepository::new(dir.path());
        let pkg = package(&[]);

        let report = repo.publish(&pkg, &mut |_root: &Path| -> Result<()> { Ok(()) }).unwrap();
        assert_eq!(report.installed, vec![dir.path().join("demo/1.0")]);
        let text = fs::read_to_string(dir.path().join("demo/1.0/package.py")).unwrap();
        assert!(!text.contains("variants"));

        let again = repo.publish(&pkg, &mut |_root: &Path| -> Result<()> { Ok(()) }).unwrap();
        assert_eq!(again.skipped.len(), 1);
    }

    #[test]
    fn test_failed_materialize_leaves_no_variant() {
        let dir = TempDir::new().unwrap();
        let repo = FilesystemRepository::new(dir.path());
        let pkg = package(&["platform-linux"]);

        let err = repo
            .publish(&pkg, &mut |_root: &Path| -> Result<()> {
                Err(Error::IoError("disk full".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("demo/1.0")).unwrap().collect();
        assert!(leftovers.is_empty());
    }
}
