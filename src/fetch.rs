// src/fetch.rs

//! Concurrent, cache-aware artifact fetching
//!
//! Every record of every group is an independent unit of work. A unit either
//! resolves a `file://` URL to a local path, reuses a cached download whose
//! digest matches, or downloads the artifact. All units run to completion;
//! a failed unit does not cancel its siblings, and the batch fails with
//! [`Error::DownloadsFailed`] only once every unit has settled.
//!
//! Units report progress over a channel to a single aggregator thread that
//! owns the progress bars, so no progress state is shared between units.

use crate::error::{Error, Result};
use crate::hash::verify_file;
use crate::records::{DownloadedArtifact, PackageGroup, ResolvedPackageRecord};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::prelude::*;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Default timeout for one download (5 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Default `User-Agent` sent with every request
pub fn default_user_agent() -> String {
    format!("rezpip/{}", env!("CARGO_PKG_VERSION"))
}

/// Fetcher settings
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub user_agent: String,
    /// Draw progress bars on stderr
    pub show_progress: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: default_user_agent(),
            show_progress: true,
        }
    }
}

/// How a unit obtained its artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Local,
    Cached,
    Downloaded(u64),
}

/// Counts reported once a batch has settled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub local: usize,
    pub cached: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub bytes: u64,
}

// =============================================================================
// Progress aggregation
// =============================================================================

#[derive(Debug)]
enum ProgressEvent {
    Started { id: usize, name: String, total: Option<u64> },
    Advanced { id: usize, bytes: u64 },
    Finished { id: usize, outcome: FetchOutcome },
    Failed { id: usize },
}

fn unit_bar(name: &str, total: Option<u64>) -> ProgressBar {
    match total {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
                    .expect("Invalid progress bar template")
                    .progress_chars("#>-"),
            );
            pb.set_message(name.to_string());
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {bytes} ({bytes_per_sec}) {msg}")
                    .expect("Invalid spinner template"),
            );
            pb.set_message(format!("{} (unknown size)", name));
            pb
        }
    }
}

/// Owns the progress bars and tallies outcomes until every sender is gone
fn spawn_aggregator(rx: Receiver<ProgressEvent>, units: usize, visible: bool) -> Result<JoinHandle<FetchSummary>> {
    thread::Builder::new()
        .name("fetch-progress".to_string())
        .spawn(move || {
            let target = if visible {
                ProgressDrawTarget::stderr()
            } else {
                ProgressDrawTarget::hidden()
            };
            let multi = MultiProgress::with_draw_target(target);
            let overall = multi.add(ProgressBar::new(0));
            overall.set_style(
                ProgressStyle::default_bar()
                    .template("Total: [{bar:40.green/dim}] {bytes}/{total_bytes} ({bytes_per_sec}) - {msg}")
                    .expect("Invalid progress bar template")
                    .progress_chars("=>-"),
            );
            overall.set_message(format!("0/{} wheels", units));

            let mut bars: HashMap<usize, ProgressBar> = HashMap::new();
            let mut summary = FetchSummary::default();

            for event in rx {
                match event {
                    ProgressEvent::Started { id, name, total } => {
                        if let Some(len) = total {
                            overall.inc_length(len);
                        }
                        bars.insert(id, multi.add(unit_bar(&name, total)));
                    }
                    ProgressEvent::Advanced { id, bytes } => {
                        overall.inc(bytes);
                        summary.bytes += bytes;
                        if let Some(pb) = bars.get(&id) {
                            pb.inc(bytes);
                        }
                    }
                    ProgressEvent::Finished { id, outcome } => {
                        match outcome {
                            FetchOutcome::Local => summary.local += 1,
                            FetchOutcome::Cached => summary.cached += 1,
                            FetchOutcome::Downloaded(_) => summary.downloaded += 1,
                        }
                        if let Some(pb) = bars.remove(&id) {
                            pb.finish_and_clear();
                        }
                    }
                    ProgressEvent::Failed { id } => {
                        summary.failed += 1;
                        if let Some(pb) = bars.remove(&id) {
                            pb.abandon();
                        }
                    }
                }
                let settled = summary.local + summary.cached + summary.downloaded + summary.failed;
                overall.set_message(format!("{}/{} wheels", settled, units));
            }

            overall.finish_and_clear();
            summary
        })
        .map_err(|e| Error::InitError(format!("Failed to start progress thread: {e}")))
}

// =============================================================================
// Fetcher
// =============================================================================

/// Resolve a `file://` URL to a local path
///
/// Percent-escapes are decoded; drive letters and UNC hosts follow RFC 8089
/// on the platforms that have them.
pub fn local_path(url: &str) -> Result<PathBuf> {
    let parsed = url::Url::parse(url).map_err(|e| Error::DownloadError(format!("Invalid URL {}: {}", url, e)))?;
    if parsed.scheme() != "file" {
        return Err(Error::DownloadError(format!("{} is not a file URL", url)));
    }
    parsed
        .to_file_path()
        .map_err(|_| Error::DownloadError(format!("Cannot map {} to a local path", url)))
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Downloads artifacts for groups of records
pub struct Fetcher {
    client: Client,
    options: FetchOptions,
}

impl Fetcher {
    pub fn new(options: FetchOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, options })
    }

    /// Fetch every record of every group into `dest_dir`
    ///
    /// The returned groups have the shape of the input groups.
    pub fn fetch(
        &self,
        groups: Vec<PackageGroup<ResolvedPackageRecord>>,
        dest_dir: &Path,
    ) -> Result<Vec<PackageGroup<DownloadedArtifact>>> {
        fs::create_dir_all(dest_dir)?;

        let sizes: Vec<usize> = groups.iter().map(PackageGroup::len).collect();
        let units: Vec<ResolvedPackageRecord> = groups.into_iter().flat_map(PackageGroup::into_records).collect();
        let total = units.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let (tx, rx) = mpsc::channel();
        let aggregator = spawn_aggregator(rx, total, self.options.show_progress)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(total)
            .thread_name(|i| format!("fetch-{}", i))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create fetch pool: {e}")))?;

        let results: Vec<Option<PathBuf>> = pool.install(|| {
            units
                .par_iter()
                .enumerate()
                .map_with(tx, |tx, (id, record)| match self.fetch_one(id, record, dest_dir, tx) {
                    Ok((path, outcome)) => {
                        let _ = tx.send(ProgressEvent::Finished { id, outcome });
                        Some(path)
                    }
                    Err(e) => {
                        error!("Failed to fetch {}: {}", record.url(), e);
                        let _ = tx.send(ProgressEvent::Failed { id });
                        None
                    }
                })
                .collect()
        });

        let summary = aggregator
            .join()
            .map_err(|_| Error::DownloadError("progress thread panicked".to_string()))?;

        let failed = results.iter().filter(|r| r.is_none()).count();
        if failed > 0 {
            return Err(Error::DownloadsFailed { failed, total });
        }

        info!(
            "Downloaded {} wheels ({} bytes), reused {} cached, {} local",
            summary.downloaded, summary.bytes, summary.cached, summary.local
        );

        let mut artifacts = units
            .into_iter()
            .zip(results.into_iter().flatten())
            .map(|(record, path)| DownloadedArtifact::new(record, path));

        Ok(sizes
            .into_iter()
            .map(|size| PackageGroup::new(artifacts.by_ref().take(size).collect()))
            .collect())
    }

    fn fetch_one(
        &self,
        id: usize,
        record: &ResolvedPackageRecord,
        dest_dir: &Path,
        tx: &Sender<ProgressEvent>,
    ) -> Result<(PathBuf, FetchOutcome)> {
        if record.is_local() {
            let path = local_path(record.url())?;
            debug!("{} is a local file: {}", record.name, path.display());
            return Ok((path, FetchOutcome::Local));
        }

        let dest = dest_dir.join(record.file_name());
        let expected = record.expected_hash();

        if dest.is_file() {
            match &expected {
                Some(hash) => match verify_file(&dest, hash) {
                    Ok(()) => {
                        debug!("Reusing cached {}", dest.display());
                        return Ok((dest, FetchOutcome::Cached));
                    }
                    Err(e) => debug!("Cached {} is stale ({}), downloading again", dest.display(), e),
                },
                None => debug!("No usable digest for {}, downloading again", record.name),
            }
        }

        let bytes = self.download(id, record, &dest, tx)?;

        if let Some(hash) = &expected {
            if let Err(e) = verify_file(&dest, hash) {
                let _ = fs::remove_file(&dest);
                return Err(Error::ChecksumMismatch {
                    expected: e.expected,
                    actual: e.actual,
                });
            }
        }

        Ok((dest, FetchOutcome::Downloaded(bytes)))
    }

    fn download(&self, id: usize, record: &ResolvedPackageRecord, dest: &Path, tx: &Sender<ProgressEvent>) -> Result<u64> {
        let url = record.url();
        debug!("Downloading {} to {}", url, dest.display());

        let mut response = self
            .client
            .get(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to download {}: {e}", url)))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!("HTTP {} from {}", response.status(), url)));
        }

        let _ = tx.send(ProgressEvent::Started {
            id,
            name: record.name.clone(),
            total: response.content_length(),
        });

        let temp_path = part_path(dest);
        let downloaded = write_part(&mut response, url, &temp_path, |bytes| {
            let _ = tx.send(ProgressEvent::Advanced { id, bytes });
        })?;

        fs::rename(&temp_path, dest).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Error::IoError(format!(
                "Failed to move {} to {}: {e}",
                temp_path.display(),
                dest.display()
            ))
        })?;

        debug!("Downloaded {} bytes to {}", downloaded, dest.display());
        Ok(downloaded)
    }
}

/// Stream `reader` into `temp_path`, removing the partial file on any error
fn write_part<R: Read>(reader: &mut R, url: &str, temp_path: &Path, mut progress: impl FnMut(u64)) -> Result<u64> {
    let result = stream_into(reader, url, temp_path, &mut progress);
    if result.is_err() {
        let _ = fs::remove_file(temp_path);
    }
    result
}

fn stream_into<R: Read>(reader: &mut R, url: &str, temp_path: &Path, progress: &mut impl FnMut(u64)) -> Result<u64> {
    let mut file = File::create(temp_path)
        .map_err(|e| Error::IoError(format!("Failed to create file {}: {e}", temp_path.display())))?;

    let mut written: u64 = 0;
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return Err(Error::DownloadError(format!("Failed to read response from {}: {e}", url))),
        };
        file.write_all(&buffer[..read])
            .map_err(|e| Error::IoError(format!("Failed to write {}: {e}", temp_path.display())))?;
        written += read as u64;
        progress(read as u64);
    }
    file.flush()?;
    Ok(written)
}
