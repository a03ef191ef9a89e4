// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use rezpip::hash::sha256;
use rezpip::records::{ArchiveInfo, DownloadInfo};
use rezpip::{HostSystem, Interpreter, PythonVersion, ResolvedPackageRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use zip::write::SimpleFileOptions;

/// A wheel to build for a test
pub struct FakeWheel<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub pure: bool,
    /// Extra `METADATA` header lines (`Requires-Dist: six`)
    pub metadata: &'a [&'a str],
    /// Archive entries besides the dist-info
    pub files: &'a [(&'a str, &'a str)],
    pub console_scripts: &'a [(&'a str, &'a str)],
}

impl<'a> FakeWheel<'a> {
    pub fn new(name: &'a str, version: &'a str) -> Self {
        Self {
            name,
            version,
            pure: true,
            metadata: &[],
            files: &[],
            console_scripts: &[],
        }
    }

    pub fn file_name(&self) -> String {
        let tag = if self.pure { "py3-none-any" } else { "cp311-cp311-linux_x86_64" };
        format!("{}-{}-{}.whl", self.name.replace('-', "_"), self.version, tag)
    }

    /// Write the wheel into `dir` and return its path
    pub fn build(&self, dir: &Path) -> PathBuf {
        let path = dir.join(self.file_name());
        let dist_info = format!("{}-{}.dist-info", self.name.replace('-', "_"), self.version);

        let mut metadata = format!("Metadata-Version: 2.1\nName: {}\nVersion: {}\n", self.name, self.version);
        for line in self.metadata {
            metadata.push_str(line);
            metadata.push('\n');
        }
        let wheel = format!(
            "Wheel-Version: 1.0\nGenerator: test\nRoot-Is-Purelib: {}\nTag: py3-none-any\n",
            self.pure
        );

        let mut entries: Vec<(String, String)> = vec![
            (format!("{}/METADATA", dist_info), metadata),
            (format!("{}/WHEEL", dist_info), wheel),
            (format!("{}/RECORD", dist_info), String::new()),
        ];
        if !self.console_scripts.is_empty() {
            let mut text = String::from("[console_scripts]\n");
            for (name, target) in self.console_scripts {
                text.push_str(&format!("{} = {}\n", name, target));
            }
            entries.push((format!("{}/entry_points.txt", dist_info), text));
        }
        entries.extend(self.files.iter().map(|(n, c)| (n.to_string(), c.to_string())));

        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in &entries {
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }
}

/// A record as the resolver report would describe it
pub fn record(name: &str, version: &str, url: &str, sha256: Option<String>) -> ResolvedPackageRecord {
    ResolvedPackageRecord {
        name: name.to_string(),
        version: version.to_string(),
        download_info: DownloadInfo {
            url: url.to_string(),
            archive_info: ArchiveInfo {
                hash: None,
                hashes: sha256
                    .map(|h| BTreeMap::from([("sha256".to_string(), h)]))
                    .unwrap_or_default(),
            },
        },
        is_direct: false,
        requested: true,
        metadata: serde_json::Map::from_iter([
            ("name".to_string(), serde_json::json!(name)),
            ("version".to_string(), serde_json::json!(version)),
        ]),
    }
}

pub fn file_url(path: &Path) -> String {
    url::Url::from_file_path(path).unwrap().to_string()
}

pub fn sha256_of(path: &Path) -> String {
    sha256(&fs::read(path).unwrap())
}

pub fn linux_host() -> HostSystem {
    HostSystem {
        platform: "linux".to_string(),
        arch: "x86_64".to_string(),
        os: "Ubuntu-22.04".to_string(),
    }
}

/// The POSIX shell standing in for a Python interpreter
///
/// The resolver runs `<interpreter> <pip.pyz> ...`, so a shell script written
/// as `pip.pyz` plays pip.
pub fn shell_interpreter() -> Interpreter {
    Interpreter {
        executable: PathBuf::from("/bin/sh"),
        version: PythonVersion::parse("3.11.4").unwrap(),
    }
}

/// Write a fake `pip.pyz` that copies `report` to wherever `--report` points
pub fn fake_pip(dir: &Path, report: &str) -> PathBuf {
    let report_path = dir.join("report-source.json");
    fs::write(&report_path, report).unwrap();

    let script = format!(
        r#"
while [ $# -gt 0 ]; do
    if [ "$1" = "--report" ]; then
        shift
        cp "{}" "$1"
    fi
    shift
done
"#,
        report_path.display()
    );
    let pip = dir.join("pip.pyz");
    fs::write(&pip, script).unwrap();
    pip
}

/// Resolver report JSON for the given records
pub fn report_json(records: &[ResolvedPackageRecord]) -> String {
    let install: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            serde_json::json!({
                "download_info": r.download_info,
                "is_direct": r.is_direct,
                "requested": r.requested,
                "metadata": r.metadata,
            })
        })
        .collect();
    serde_json::json!({ "version": "1", "install": install }).to_string()
}

/// Every path below `root`, relative to it
pub fn snapshot(root: &Path) -> BTreeSet<PathBuf> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeSet<PathBuf>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            out.insert(path.strip_prefix(root).unwrap().to_path_buf());
            if path.is_dir() && !path.is_symlink() {
                walk(root, &path, out);
            }
        }
    }
    let mut out = BTreeSet::new();
    walk(root, root, &mut out);
    out
}

/// A tiny HTTP server serving `files` by path
pub struct TestServer {
    pub base_url: String,
    pub requests: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn start(files: HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                counter.fetch_add(1, Ordering::SeqCst);

                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                let mut header = String::new();
                while reader.read_line(&mut header).map(|n| n > 0).unwrap_or(false) && header != "\r\n" {
                    header.clear();
                }

                let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
                let response = match files.get(&path) {
                    Some(body) => {
                        let mut r = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        r.extend_from_slice(body);
                        r
                    }
                    None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
                };
                let _ = stream.write_all(&response);
                let _ = stream.flush();
            }
        });

        Self { base_url, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}
