// src/assemble.rs

//! Package assembly
//!
//! A group of installed distributions becomes one [`TargetPackage`]:
//!
//! - name and version come from the first member
//! - requirements are the de-duplicated union over all members, minus
//!   references to members of the same group
//! - the package is pure only if every member is
//! - the copy plan maps every installed file to its place in the variant
//!
//! Core metadata of the first member is converted into package fields; what
//! is not converted is kept verbatim in the provenance block.

use crate::error::{Error, Result};
use crate::hooks::HookRegistry;
use crate::install::{CoreMetadata, Distribution};
use crate::records::{DownloadedArtifact, PackageGroup};
use crate::requirement::TargetRequirement;
use crate::rezreq::{RequirementContext, join, rez_requirements};
use crate::translate::{translate_name, translate_version};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Package fields derived from core metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertedMetadata {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub license: Option<String>,
    /// `(label, url)` pairs in declaration order
    pub help: Vec<(String, String)>,
}

/// Read a converted field and drop it from the residual metadata
fn take(
    meta: &CoreMetadata,
    residual: &mut serde_json::Map<String, serde_json::Value>,
    field: &str,
    key: &str,
) -> Option<String> {
    let value = meta.get(field).map(str::to_string);
    if value.is_some() {
        residual.remove(key);
    }
    value
}

fn split_emails(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Convert core metadata into package fields
///
/// Returns the converted fields and the JSON metadata with every converted
/// field (and name/version) removed.
pub fn convert_metadata(meta: &CoreMetadata) -> (ConvertedMetadata, serde_json::Map<String, serde_json::Value>) {
    let mut residual = meta.to_json();
    for key in ["metadata_version", "name", "version"] {
        residual.remove(key);
    }

    let summary = take(meta, &mut residual, "Summary", "summary");
    let description = take(meta, &mut residual, "Description", "description");

    let mut authors = Vec::new();
    authors.extend(take(meta, &mut residual, "Author", "author"));
    authors.extend(take(meta, &mut residual, "Author-email", "author_email").iter().flat_map(|v| split_emails(v)));
    authors.extend(take(meta, &mut residual, "Maintainer", "maintainer"));
    authors.extend(take(meta, &mut residual, "Maintainer-email", "maintainer_email").iter().flat_map(|v| split_emails(v)));

    let license = take(meta, &mut residual, "License", "license").or_else(|| {
        let classifiers: Vec<&str> = meta
            .get_all("Classifier")
            .into_iter()
            .filter(|c| c.starts_with("License ::"))
            .collect();
        match classifiers.as_slice() {
            [only] => only.rsplit("::").next().map(|s| s.trim().to_string()),
            _ => None,
        }
    });

    let mut help = Vec::new();
    if let Some(home) = take(meta, &mut residual, "Home-page", "home_page") {
        help.push(("Home-page".to_string(), home));
    }
    let project_urls = meta.get_all("Project-URL");
    if !project_urls.is_empty() {
        let parts: Vec<String> = project_urls
            .iter()
            .flat_map(|v| v.split(','))
            .map(|s| s.trim().to_string())
            .collect();
        help.extend(parts.chunks_exact(2).map(|pair| (pair[0].clone(), pair[1].clone())));
        residual.remove("project_url");
    }
    if let Some(download) = take(meta, &mut residual, "Download-URL", "download_url") {
        help.push(("Download-URL".to_string(), download));
    }

    (
        ConvertedMetadata {
            summary,
            description,
            authors,
            license,
            help,
        },
        residual,
    )
}

/// Where the package came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub name: String,
    pub version: String,
    pub is_pure_python: bool,
    pub wheel_urls: Vec<String>,
    pub rezpip_version: String,
    /// Upstream metadata not converted into package fields
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// One file of the copy plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyEntry {
    pub source: PathBuf,
    /// Path relative to the variant root
    pub relative: PathBuf,
}

/// A package ready to be published
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPackage {
    pub name: String,
    pub version: String,
    pub metadata: ConvertedMetadata,
    pub requires: Vec<TargetRequirement>,
    /// Requirements of the single variant; empty means no variants
    pub variant_requires: Vec<TargetRequirement>,
    pub tools: Vec<String>,
    pub commands: Vec<String>,
    pub is_pure: bool,
    pub provenance: Provenance,
    pub copy_plan: Vec<CopyEntry>,
}

impl TargetPackage {
    /// Copy every planned file below `root`
    pub fn materialize(&self, root: &Path) -> Result<()> {
        info!(
            "Installing {}-{} [{}]",
            self.name,
            self.version,
            join(&self.variant_requires)
        );

        for entry in &self.copy_plan {
            let dest = root.join(&entry.relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            debug!("Copying {} to {}", entry.source.display(), dest.display());
            fs::copy(&entry.source, &dest).map_err(|e| {
                Error::IoError(format!(
                    "Failed to copy {} to {}: {e}",
                    entry.source.display(),
                    dest.display()
                ))
            })?;
        }
        Ok(())
    }
}

/// Plan the copy of a distribution's files
///
/// `<install_root>/<dist dir>/python/x.py` becomes `python/x.py`.
fn copy_plan(dist: &Distribution, install_root: &Path) -> Result<Vec<CopyEntry>> {
    if dist.files.is_empty() {
        return Err(Error::InstallError(format!(
            "{} has no installed files",
            dist.name
        )));
    }

    dist.files
        .iter()
        .map(|file| {
            let relative = file.strip_prefix(install_root).map_err(|_| {
                Error::InstallError(format!(
                    "{} is outside of {}",
                    file.display(),
                    install_root.display()
                ))
            })?;
            let relative: PathBuf = relative.components().skip(1).collect();
            if relative.as_os_str().is_empty() {
                return Err(Error::InstallError(format!("{} is not inside a distribution directory", file.display())));
            }
            Ok(CopyEntry {
                source: file.clone(),
                relative,
            })
        })
        .collect()
}

fn push_unique(into: &mut Vec<TargetRequirement>, reqs: Vec<TargetRequirement>, excluded: &BTreeSet<String>) {
    for req in reqs {
        if excluded.contains(&req.name.to_lowercase()) {
            debug!("Dropping intra-group requirement {}", req);
            continue;
        }
        if !into.contains(&req) {
            into.push(req);
        }
    }
}

/// Merge an installed group into one package, then let hooks adjust it
pub fn assemble(
    group: &PackageGroup<DownloadedArtifact>,
    install_root: &Path,
    ctx: &RequirementContext<'_>,
    hooks: &HookRegistry,
) -> Result<TargetPackage> {
    if !group.is_installed() {
        return Err(Error::InstallError(format!(
            "group {} has {} distributions for {} records",
            group.names().join(" + "),
            group.distributions().len(),
            group.len()
        )));
    }

    let dists = group.distributions();
    let first = &dists[0];
    info!(
        "Creating package for {}",
        dists.iter().map(|d| d.name.as_str()).collect::<Vec<_>>().join(" + ")
    );

    let member_names: BTreeSet<String> = dists
        .iter()
        .map(|d| translate_name(&d.name).to_lowercase())
        .collect();

    let mut requires = Vec::new();
    let mut variant_requires = Vec::new();
    let mut is_pure = true;
    let mut tools: Vec<String> = Vec::new();
    let mut copy = Vec::new();

    for dist in dists {
        let reqs = rez_requirements(dist, ctx)?;
        push_unique(&mut requires, reqs.requires, &member_names);
        push_unique(&mut variant_requires, reqs.variant_requires, &member_names);
        is_pure &= reqs.is_pure;

        for script in dist.console_scripts() {
            if !tools.iter().any(|t| t == script) {
                tools.push(script.to_string());
            }
        }
        copy.extend(copy_plan(dist, install_root)?);
    }

    let mut commands = vec!["env.PYTHONPATH.append('{root}/python')".to_string()];
    if !tools.is_empty() {
        commands.push("env.PATH.append('{root}/scripts')".to_string());
    }

    let (metadata, residual) = convert_metadata(&first.metadata);
    let first_record = &group.records()[0].record;

    let mut package = TargetPackage {
        name: translate_name(&first.name),
        version: translate_version(&first.version)?,
        metadata,
        requires,
        variant_requires,
        tools,
        commands,
        is_pure,
        provenance: Provenance {
            name: first_record.name.clone(),
            version: first_record.version.clone(),
            is_pure_python: is_pure,
            wheel_urls: group.download_urls(),
            rezpip_version: env!("CARGO_PKG_VERSION").to_string(),
            metadata: residual,
        },
        copy_plan: copy,
    };

    hooks.metadata(&mut package)?;
    Ok(package)
}
