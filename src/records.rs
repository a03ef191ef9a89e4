// src/records.rs

//! Resolved package records and package groups
//!
//! Records are created once from the resolver report and never mutated.
//! Grouping hooks partition them into [`PackageGroup`]s; the fetcher turns a
//! group of records into a group of [`DownloadedArtifact`]s of the same shape,
//! and installation attaches one [`Distribution`] per member.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::install::Distribution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where and how to download an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub url: String,
    #[serde(default)]
    pub archive_info: ArchiveInfo,
}

/// Advertised digests of an artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Legacy single `algo=hex` digest
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
}

/// One resolved upstream dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPackageRecord {
    pub name: String,
    pub version: String,
    pub download_info: DownloadInfo,
    pub is_direct: bool,
    pub requested: bool,
    /// Raw upstream metadata block
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ResolvedPackageRecord {
    pub fn url(&self) -> &str {
        &self.download_info.url
    }

    /// Whether the artifact is already on the local filesystem
    pub fn is_local(&self) -> bool {
        self.download_info.url.starts_with("file:")
    }

    /// File name component of the download URL
    pub fn file_name(&self) -> String {
        let from_url = url::Url::parse(&self.download_info.url)
            .ok()
            .and_then(|u| u.path_segments().and_then(|mut s| s.next_back().map(str::to_string)))
            .filter(|s| !s.is_empty());

        from_url.unwrap_or_else(|| {
            let trimmed = self.download_info.url.split(['?', '#']).next().unwrap_or_default();
            match trimmed.rsplit('/').next() {
                Some(last) if !last.is_empty() => last.to_string(),
                _ => format!("{}-{}.whl", self.name, self.version),
            }
        })
    }

    /// Digest to verify a cached copy against, if any usable one is advertised
    pub fn expected_hash(&self) -> Option<Hash> {
        let info = &self.download_info.archive_info;
        Hash::select(&info.hashes).or_else(|| info.hash.as_deref().and_then(|h| Hash::parse_report_hash(h).ok()))
    }
}

impl AsRef<ResolvedPackageRecord> for ResolvedPackageRecord {
    fn as_ref(&self) -> &ResolvedPackageRecord {
        self
    }
}

/// A record with its artifact on the local filesystem
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedArtifact {
    pub record: ResolvedPackageRecord,
    pub path: PathBuf,
}

impl DownloadedArtifact {
    pub fn new(record: ResolvedPackageRecord, path: impl Into<PathBuf>) -> Self {
        Self {
            record,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRef<ResolvedPackageRecord> for DownloadedArtifact {
    fn as_ref(&self) -> &ResolvedPackageRecord {
        &self.record
    }
}

/// Records destined to become one target package
///
/// Element `i` of `records` and of `distributions` describe the same
/// upstream package once installation has completed.
#[derive(Debug, Clone)]
pub struct PackageGroup<T> {
    records: Vec<T>,
    distributions: Vec<Distribution>,
}

impl<T> PackageGroup<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records,
            distributions: Vec::new(),
        }
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn distributions(&self) -> &[Distribution] {
        &self.distributions
    }

    /// Attach the distribution installed for the next member
    pub fn push_distribution(&mut self, dist: Distribution) -> Result<()> {
        if self.distributions.len() >= self.records.len() {
            return Err(Error::InstallError(format!(
                "group already has {} distributions for {} records",
                self.distributions.len(),
                self.records.len()
            )));
        }
        self.distributions.push(dist);
        Ok(())
    }

    /// Whether every member has its distribution attached
    pub fn is_installed(&self) -> bool {
        !self.records.is_empty() && self.distributions.len() == self.records.len()
    }

    pub fn into_records(self) -> Vec<T> {
        self.records
    }
}

impl<T: AsRef<ResolvedPackageRecord>> PackageGroup<T> {
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.as_ref().name.as_str()).collect()
    }

    pub fn download_urls(&self) -> Vec<String> {
        self.records.iter().map(|r| r.as_ref().url().to_string()).collect()
    }
}

// =============================================================================
// Resolver report
// =============================================================================

#[derive(Debug, Deserialize)]
struct ResolutionReport {
    #[serde(default)]
    install: Vec<ReportEntry>,
}

#[derive(Debug, Deserialize)]
struct ReportEntry {
    download_info: DownloadInfo,
    #[serde(default)]
    is_direct: bool,
    #[serde(default)]
    requested: bool,
    metadata: serde_json::Map<String, serde_json::Value>,
}

fn metadata_str(entry: &ReportEntry, key: &str) -> Result<String> {
    entry
        .metadata
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::ParseError(format!(
                "Resolver report entry for {} has no metadata '{}'",
                entry.download_info.url, key
            ))
        })
}

/// Parse a resolver report into records, in report order
pub fn parse_report(json: &str) -> Result<Vec<ResolvedPackageRecord>> {
    let report: ResolutionReport = serde_json::from_str(json)
        .map_err(|e| Error::ParseError(format!("Invalid resolver report: {}", e)))?;

    let records = report
        .install
        .into_iter()
        .map(|entry| {
            let name = metadata_str(&entry, "name")?;
            let version = metadata_str(&entry, "version")?;
            Ok(ResolvedPackageRecord {
                name,
                version,
                download_info: entry.download_info,
                is_direct: entry.is_direct,
                requested: entry.requested,
                metadata: entry.metadata,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!("Resolver report lists {} packages", records.len());
    Ok(records)
}
