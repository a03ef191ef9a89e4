// src/install.rs

//! Wheel installation and installed distributions
//!
//! A wheel is unpacked into a per-distribution directory laid out the way
//! the final package variant will be:
//!
//! ```text
//! <target>/python/          purelib, platlib and root entries
//! <target>/scripts/         .data/scripts and generated entry point launchers
//! <target>/headers/<name>/  .data/headers
//! <target>/                 .data/data
//! ```
//!
//! The result is a [`Distribution`] describing the installed files and the
//! core metadata read back from the `.dist-info` directory.

use crate::error::{Error, Result};
use crate::records::DownloadedArtifact;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Installs an artifact into a target directory
pub trait Installer: Send + Sync {
    fn install(&self, artifact: &DownloadedArtifact, target: &Path) -> Result<Distribution>;
}

// =============================================================================
// Core metadata
// =============================================================================

/// Fields that may appear more than once in core metadata
const MULTI_USE_FIELDS: &[&str] = &[
    "dynamic",
    "platform",
    "supported-platform",
    "license-file",
    "classifier",
    "requires-dist",
    "requires-external",
    "project-url",
    "provides-extra",
    "provides-dist",
    "obsoletes-dist",
];

/// Core metadata headers (`METADATA`), keeping repeated fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreMetadata {
    headers: Vec<(String, String)>,
}

impl CoreMetadata {
    /// Parse RFC 822 style metadata; a body after the headers becomes the
    /// `Description` field
    pub fn parse(text: &str) -> Self {
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut lines = text.lines();

        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = headers.last_mut() {
                    value.push('\n');
                    value.push_str(line.trim_start().trim_start_matches('|'));
                }
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        let body: Vec<&str> = lines.collect();
        let body = body.join("\n");
        if !body.trim().is_empty() && !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("description")) {
            headers.push(("Description".to_string(), body.trim_end().to_string()));
        }

        Self { headers }
    }

    /// First value of a field, case-insensitive
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a field, in declaration order
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// JSON form of the metadata (PEP 566): lowercase keys with `_`,
    /// multi-use fields as arrays, `keywords` as a list
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        use serde_json::Value;

        let mut map = serde_json::Map::new();
        for (key, value) in &self.headers {
            let lower = key.to_ascii_lowercase();
            let json_key = lower.replace('-', "_");

            if MULTI_USE_FIELDS.contains(&lower.as_str()) {
                let entry = map.entry(json_key).or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = entry {
                    items.push(Value::String(value.clone()));
                }
            } else if lower == "keywords" {
                let sep = if value.contains(',') { ',' } else { ' ' };
                let words = value
                    .split(sep)
                    .map(str::trim)
                    .filter(|w| !w.is_empty())
                    .map(|w| Value::String(w.to_string()))
                    .collect();
                map.insert(json_key, Value::Array(words));
            } else {
                map.entry(json_key).or_insert_with(|| Value::String(value.clone()));
            }
        }
        map
    }
}

// =============================================================================
// Distribution
// =============================================================================

/// One entry point from `entry_points.txt`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    /// `module:attr`
    pub value: String,
    pub group: String,
}

impl EntryPoint {
    fn module(&self) -> &str {
        self.value.split(':').next().unwrap_or_default().trim()
    }

    fn attr(&self) -> Option<&str> {
        self.value
            .split_once(':')
            .map(|(_, attr)| attr.split('[').next().unwrap_or(attr).trim())
    }
}

/// Parse `entry_points.txt` (INI style)
fn parse_entry_points(text: &str) -> Vec<EntryPoint> {
    let mut group = String::new();
    let mut entries = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            group = name.trim().to_string();
            continue;
        }
        if let Some((name, value)) = line.split_once('=') {
            entries.push(EntryPoint {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
                group: group.clone(),
            });
        }
    }
    entries
}

/// An installed distribution
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub name: String,
    pub version: String,
    pub metadata: CoreMetadata,
    pub entry_points: Vec<EntryPoint>,
    /// `Root-Is-Purelib` from the `WHEEL` file
    pub is_pure: bool,
    /// Absolute paths of every installed file
    pub files: Vec<PathBuf>,
    pub dist_info: PathBuf,
}

impl Distribution {
    /// Locate `<name>-<version>.dist-info` under `site_dir`
    pub fn locate_dist_info(site_dir: &Path, name: &str, version: &str) -> Result<PathBuf> {
        let base = format!("{}-{}.dist-info", name.replace('-', "_"), version);
        let candidates = [base.clone(), base.to_lowercase()];

        candidates
            .iter()
            .map(|c| site_dir.join(c))
            .find(|p| p.is_dir())
            .ok_or_else(|| {
                Error::InstallError(format!(
                    "No {} found in {}",
                    base,
                    site_dir.display()
                ))
            })
    }

    /// Read a distribution back from its `.dist-info` directory
    pub fn from_dist_info(dist_info: &Path, files: Vec<PathBuf>) -> Result<Self> {
        let read = |file: &str| -> Result<Option<String>> {
            match fs::read_to_string(dist_info.join(file)) {
                Ok(text) => Ok(Some(text)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(Error::InstallError(format!(
                    "Cannot read {}: {}",
                    dist_info.join(file).display(),
                    e
                ))),
            }
        };

        let metadata_text = read("METADATA")?.ok_or_else(|| {
            Error::InstallError(format!("{} has no METADATA", dist_info.display()))
        })?;
        let metadata = CoreMetadata::parse(&metadata_text);

        let name = metadata
            .get("Name")
            .ok_or_else(|| Error::InstallError(format!("{}: METADATA has no Name", dist_info.display())))?
            .to_string();
        let version = metadata
            .get("Version")
            .ok_or_else(|| Error::InstallError(format!("{}: METADATA has no Version", dist_info.display())))?
            .to_string();

        let is_pure = read("WHEEL")?
            .map(|text| CoreMetadata::parse(&text))
            .and_then(|wheel| wheel.get("Root-Is-Purelib").map(|v| v.eq_ignore_ascii_case("true")))
            .unwrap_or(false);

        let entry_points = read("entry_points.txt")?
            .map(|text| parse_entry_points(&text))
            .unwrap_or_default();

        Ok(Self {
            name,
            version,
            metadata,
            entry_points,
            is_pure,
            files,
            dist_info: dist_info.to_path_buf(),
        })
    }

    /// Declared requirements (`Requires-Dist`)
    pub fn requires(&self) -> Vec<&str> {
        self.metadata.get_all("Requires-Dist")
    }

    pub fn provides_extra(&self) -> Vec<&str> {
        self.metadata.get_all("Provides-Extra")
    }

    pub fn requires_python(&self) -> Option<&str> {
        self.metadata.get("Requires-Python").filter(|v| !v.trim().is_empty())
    }

    /// Names of `console_scripts` entry points
    pub fn console_scripts(&self) -> Vec<&str> {
        self.entry_points
            .iter()
            .filter(|ep| ep.group == "console_scripts")
            .map(|ep| ep.name.as_str())
            .collect()
    }

    /// Drop removed paths from the manifest
    ///
    /// A removed directory drops every file below it.
    pub fn remove_files(&mut self, removed: &[PathBuf]) {
        let before = self.files.len();
        self.files
            .retain(|file| !removed.iter().any(|r| file == r || file.starts_with(r)));
        debug!(
            "Dropped {} files from the {} manifest",
            before - self.files.len(),
            self.name
        );
    }

    #[cfg(test)]
    pub(crate) fn for_tests(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            metadata: CoreMetadata::parse(&format!("Name: {}\nVersion: {}\n", name, version)),
            entry_points: Vec::new(),
            is_pure: true,
            files: Vec::new(),
            dist_info: PathBuf::from(format!("{}-{}.dist-info", name, version)),
        }
    }
}

// =============================================================================
// Wheel installer
// =============================================================================

/// Installs `.whl` archives
#[derive(Debug, Clone, Default)]
pub struct WheelInstaller;

impl WheelInstaller {
    pub fn new() -> Self {
        Self
    }
}

/// Where an archive entry goes, relative to the target
fn destination(entry: &Path, data_dir: Option<&str>, name: &str) -> Result<PathBuf> {
    let mut components = entry.components();
    let first = match components.next() {
        Some(Component::Normal(c)) => c.to_string_lossy().into_owned(),
        _ => return Err(Error::InstallError(format!("Unsafe wheel entry {}", entry.display()))),
    };

    if data_dir == Some(first.as_str()) {
        let scheme = components
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default();
        let rest: PathBuf = components.collect();
        return match scheme.as_str() {
            "purelib" | "platlib" => Ok(Path::new("python").join(rest)),
            "scripts" => Ok(Path::new("scripts").join(rest)),
            "headers" => Ok(Path::new("headers").join(name).join(rest)),
            "data" => Ok(rest),
            other => Err(Error::InstallError(format!(
                "Unknown wheel data scheme '{}' in {}",
                other,
                entry.display()
            ))),
        };
    }

    Ok(Path::new("python").join(entry))
}

/// POSIX launcher for an entry point
fn launcher_script(entry: &EntryPoint) -> String {
    let module = entry.module();
    let (import, call) = match entry.attr() {
        Some(attr) => {
            let head = attr.split('.').next().unwrap_or(attr);
            (format!("from {} import {}", module, head), attr.to_string())
        }
        None => (format!("import {}", module), module.to_string()),
    };

    format!(
        "#!/usr/bin/env python\n\
         # -*- coding: utf-8 -*-\n\
         import re\n\
         import sys\n\
         {import}\n\
         if __name__ == \"__main__\":\n    \
         sys.argv[0] = re.sub(r\"(-script\\.pyw|\\.exe)?$\", \"\", sys.argv[0])\n    \
         sys.exit({call}())\n"
    )
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

impl Installer for WheelInstaller {
    fn install(&self, artifact: &DownloadedArtifact, target: &Path) -> Result<Distribution> {
        let record = &artifact.record;
        info!("Installing {} {} into {}", record.name, record.version, target.display());

        let file = File::open(artifact.path()).map_err(|e| {
            Error::InstallError(format!("Cannot open {}: {}", artifact.path().display(), e))
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            Error::InstallError(format!("Invalid wheel {}: {}", artifact.path().display(), e))
        })?;

        let data_dir = archive
            .file_names()
            .filter_map(|n| n.split('/').next())
            .find(|first| first.ends_with(".data"))
            .map(str::to_string);

        let mut files = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| {
                Error::InstallError(format!("Cannot read wheel entry {}: {}", i, e))
            })?;

            let enclosed = entry.enclosed_name().ok_or_else(|| {
                Error::InstallError(format!(
                    "Unsafe wheel entry '{}' in {}",
                    entry.name(),
                    artifact.path().display()
                ))
            })?;
            if entry.is_dir() {
                continue;
            }

            let relative = destination(&enclosed, data_dir.as_deref(), &record.name)?;
            let out = target.join(&relative);
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }

            let is_script = relative.starts_with("scripts");
            if is_script {
                let mut content = Vec::new();
                entry.read_to_end(&mut content)?;
                if let Some(rest) = content.strip_prefix(b"#!python") {
                    let mut rewritten = b"#!/usr/bin/env python".to_vec();
                    rewritten.extend_from_slice(rest);
                    content = rewritten;
                }
                fs::write(&out, content)?;
                set_mode(&out, 0o755)?;
            } else {
                let mut writer = File::create(&out)?;
                io::copy(&mut entry, &mut writer)?;
                if let Some(mode) = entry.unix_mode() {
                    set_mode(&out, mode & 0o777)?;
                }
            }
            files.push(out);
        }

        let dist_info = Distribution::locate_dist_info(&target.join("python"), &record.name, &record.version)?;
        let mut dist = Distribution::from_dist_info(&dist_info, files)?;

        for entry in dist
            .entry_points
            .iter()
            .filter(|ep| ep.group == "console_scripts" || ep.group == "gui_scripts")
        {
            let script = target.join("scripts").join(&entry.name);
            if let Some(parent) = script.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&script, launcher_script(entry))?;
            set_mode(&script, 0o755)?;
            debug!("Generated launcher {}", script.display());
            dist.files.push(script);
        }

        debug!("Installed {} files for {}", dist.files.len(), dist.name);
        Ok(dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ArchiveInfo, DownloadInfo, ResolvedPackageRecord};
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    const METADATA: &str = "Metadata-Version: 2.1
Name: demo-pkg
Version: 1.2.0
Summary: A demo
Requires-Python: >=3.8
Requires-Dist: six (>=1.0)
Requires-Dist: pytest ; extra == 'test'
Provides-Extra: test
Classifier: License :: OSI Approved :: MIT License
Classifier: Programming Language :: Python
Keywords: demo,example

Long description
spanning lines.
";

    fn build_wheel(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("demo_pkg-1.2.0-py3-none-any.whl");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn artifact(path: PathBuf) -> DownloadedArtifact {
        let record = ResolvedPackageRecord {
            name: "demo-pkg".to_string(),
            version: "1.2.0".to_string(),
            download_info: DownloadInfo {
                url: "https://files.example/demo_pkg-1.2.0-py3-none-any.whl".to_string(),
                archive_info: ArchiveInfo::default(),
            },
            is_direct: false,
            requested: true,
            metadata: serde_json::Map::new(),
        };
        DownloadedArtifact::new(record, path)
    }

    #[test]
    fn test_core_metadata() {
        let meta = CoreMetadata::parse(METADATA);
        assert_eq!(meta.get("name"), Some("demo-pkg"));
        assert_eq!(meta.get_all("Requires-Dist").len(), 2);
        assert_eq!(meta.get("Description"), Some("Long description\nspanning lines."));

        let json = meta.to_json();
        assert_eq!(json["summary"], "A demo");
        assert_eq!(json["requires_dist"].as_array().unwrap().len(), 2);
        assert_eq!(json["classifier"].as_array().unwrap().len(), 2);
        assert_eq!(json["keywords"], serde_json::json!(["demo", "example"]));
        assert_eq!(json["requires_python"], ">=3.8");
    }

    #[test]
    fn test_entry_points() {
        let eps = parse_entry_points("[console_scripts]\ndemo = demo.cli:main\n\n[gui_scripts]\ndemo-gui = demo.gui:App.run [gui]\n");
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[0].module(), "demo.cli");
        assert_eq!(eps[1].attr(), Some("App.run"));

        let script = launcher_script(&eps[1]);
        assert!(script.starts_with("#!/usr/bin/env python\n"));
        assert!(script.contains("from demo.gui import App\n"));
        assert!(script.contains("sys.exit(App.run())"));
    }

    #[test]
    fn test_install_wheel_layout() {
        let dir = TempDir::new().unwrap();
        let wheel = build_wheel(
            dir.path(),
            &[
                ("demo_pkg/__init__.py", "VALUE = 1\n"),
                ("demo_pkg-1.2.0.data/scripts/tool", "#!python\nprint('hi')\n"),
                ("demo_pkg-1.2.0.data/headers/demo.h", "int x;\n"),
                ("demo_pkg-1.2.0.data/data/share/demo.txt", "data\n"),
                ("demo_pkg-1.2.0.dist-info/METADATA", METADATA),
                ("demo_pkg-1.2.0.dist-info/WHEEL", "Wheel-Version: 1.0\nRoot-Is-Purelib: true\n"),
                ("demo_pkg-1.2.0.dist-info/entry_points.txt", "[console_scripts]\ndemo = demo_pkg:main\n"),
            ],
        );
        let target = dir.path().join("installed/demo-pkg");

        let dist = WheelInstaller::new().install(&artifact(wheel), &target).unwrap();
        assert_eq!(dist.name, "demo-pkg");
        assert!(dist.is_pure);
        assert_eq!(dist.requires_python(), Some(">=3.8"));
        assert_eq!(dist.provides_extra(), vec!["test"]);
        assert_eq!(dist.console_scripts(), vec!["demo"]);

        assert!(target.join("python/demo_pkg/__init__.py").is_file());
        assert!(target.join("headers/demo-pkg/demo.h").is_file());
        assert!(target.join("share/demo.txt").is_file());
        let tool = fs::read_to_string(target.join("scripts/tool")).unwrap();
        assert!(tool.starts_with("#!/usr/bin/env python\n"));
        assert!(target.join("scripts/demo").is_file());
        assert!(dist.files.iter().all(|f| f.starts_with(&target)));
        assert_eq!(dist.files.len(), 8);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(target.join("scripts/demo")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_install_rejects_unsafe_entries() {
        let dir = TempDir::new().unwrap();
        let wheel = build_wheel(dir.path(), &[("../escape.py", "x\n")]);
        let err = WheelInstaller::new()
            .install(&artifact(wheel), &dir.path().join("t"))
            .unwrap_err();
        assert!(matches!(err, Error::InstallError(_)));
        assert!(!dir.path().join("escape.py").exists());
    }

    #[test]
    fn test_missing_dist_info() {
        let dir = TempDir::new().unwrap();
        let wheel = build_wheel(dir.path(), &[("demo_pkg/__init__.py", "")]);
        let err = WheelInstaller::new()
            .install(&artifact(wheel), &dir.path().join("t"))
            .unwrap_err();
        assert!(matches!(err, Error::InstallError(ref m) if m.contains("dist-info")));
    }

    #[test]
    fn test_remove_files() {
        let mut dist = Distribution::for_tests("demo", "1.0");
        dist.files = vec![
            PathBuf::from("/t/python/a/x.py"),
            PathBuf::from("/t/python/a/y.py"),
            PathBuf::from("/t/python/ab.py"),
            PathBuf::from("/t/python/b.py"),
        ];
        dist.remove_files(&[PathBuf::from("/t/python/a"), PathBuf::from("/t/python/b.py")]);
        assert_eq!(dist.files, vec![PathBuf::from("/t/python/ab.py")]);
    }
}
