// src/resolver.rs

//! External dependency resolution
//!
//! Resolution is delegated to pip running in dry-run mode. pip writes a JSON
//! report of everything it would install; nothing is installed and nothing is
//! downloaded by pip itself.

use crate::error::{Error, Result};
use crate::interpreter::Interpreter;
use crate::records::{ResolvedPackageRecord, parse_report};
use crate::requirement::CanonicalRequirement;
use crate::translate::canonicalize_name;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// What the user asked to resolve
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub packages: Vec<String>,
    pub requirement_files: Vec<PathBuf>,
    pub constraint_files: Vec<PathBuf>,
    /// Passed through to pip verbatim, after every generated argument
    pub extra_args: Vec<String>,
}

impl ResolveRequest {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.requirement_files.is_empty()
    }

    /// Extras requested on the command line, keyed by canonical name
    ///
    /// `foo[bar,baz]>=1` requests extras `bar` and `baz` of `foo`. Arguments
    /// that are not requirements (local paths, URLs) are ignored.
    pub fn requested_extras(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut extras: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for package in &self.packages {
            match CanonicalRequirement::parse(package) {
                Ok(req) if !req.extras.is_empty() => {
                    extras
                        .entry(canonicalize_name(&req.name))
                        .or_default()
                        .extend(req.extras);
                }
                Ok(_) => {}
                Err(e) => debug!("Not reading extras from '{}': {}", package, e),
            }
        }
        extras
    }
}

/// Runs pip to turn a request into resolved records
#[derive(Debug, Clone)]
pub struct Resolver {
    pip: PathBuf,
}

impl Resolver {
    pub fn new(pip: impl Into<PathBuf>) -> Self {
        Self { pip: pip.into() }
    }

    pub fn pip(&self) -> &Path {
        &self.pip
    }

    /// Arguments passed to the interpreter
    pub fn arguments(
        &self,
        python_version: &str,
        request: &ResolveRequest,
        target: &Path,
        report: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![self.pip.clone().into(), "install".into(), "-q".into()];
        args.extend(request.packages.iter().map(OsString::from));
        for file in &request.requirement_files {
            args.push("-r".into());
            args.push(file.clone().into());
        }
        for file in &request.constraint_files {
            args.push("-c".into());
            args.push(file.clone().into());
        }
        args.extend(
            [
                "--disable-pip-version-check".to_string(),
                "--dry-run".to_string(),
                "--ignore-installed".to_string(),
                format!("--python-version={}", python_version),
                "--only-binary=:all:".to_string(),
            ]
            .map(OsString::from),
        );
        let mut target_arg = OsString::from("--target=");
        target_arg.push(target);
        args.push(target_arg);
        args.push("--report".into());
        args.push(report.into());
        args.extend(request.extra_args.iter().map(OsString::from));
        args
    }

    /// Resolve `request` for `interpreter`
    ///
    /// The report and pip's scratch target live under `work_dir`.
    pub fn resolve(
        &self,
        interpreter: &Interpreter,
        request: &ResolveRequest,
        work_dir: &Path,
    ) -> Result<Vec<ResolvedPackageRecord>> {
        let python_version = interpreter.version.short();
        let report = tempfile::Builder::new()
            .prefix("pip-report-")
            .suffix(".json")
            .tempfile_in(work_dir)?;
        let target = tempfile::Builder::new().prefix("pip-target-").tempdir_in(work_dir)?;

        let args = self.arguments(&python_version, request, target.path(), report.path());
        let command_line = std::iter::once(interpreter.executable.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        info!("Resolving dependencies for python {}", python_version);
        debug!("Running {}", command_line);

        let output = Command::new(&interpreter.executable)
            .args(&args)
            .output()
            .map_err(|e| Error::ResolutionError {
                command: command_line.clone(),
                output: e.to_string(),
            })?;

        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(Error::ResolutionError {
                command: command_line,
                output: captured.trim_end().to_string(),
            });
        }
        if !captured.trim().is_empty() {
            debug!("pip reported:\n{}", captured.trim_end());
        }

        let content = std::fs::read_to_string(report.path()).map_err(|e| {
            Error::IoError(format!(
                "Failed to read resolver report {}: {}",
                report.path().display(),
                e
            ))
        })?;
        let records = parse_report(&content)?;

        info!("Resolved {} dependencies for python {}", records.len(), python_version);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::PythonVersion;
    use std::fs;
    use tempfile::TempDir;

    /// Uses the POSIX shell as "interpreter" and a shell script as pip.
    fn shell_interpreter() -> Interpreter {
        Interpreter {
            executable: PathBuf::from("/bin/sh"),
            version: PythonVersion::parse("3.11.4").unwrap(),
        }
    }

    const FAKE_PIP: &str = r#"
while [ $# -gt 0 ]; do
    if [ "$1" = "--report" ]; then
        shift
        report="$1"
    fi
    shift
done
cat > "$report" <<'EOF'
{"install": [{"download_info": {"url": "https://files.example/six-1.16.0-py2.py3-none-any.whl",
  "archive_info": {"hashes": {}}}, "is_direct": false, "requested": true,
  "metadata": {"name": "six", "version": "1.16.0"}}]}
EOF
"#;

    #[test]
    fn test_arguments() {
        let resolver = Resolver::new("/opt/pip.pyz");
        let request = ResolveRequest {
            packages: vec!["six".to_string()],
            requirement_files: vec![PathBuf::from("reqs.txt")],
            constraint_files: vec![PathBuf::from("cons.txt")],
            extra_args: vec!["--index-url".to_string(), "https://mirror".to_string()],
        };
        let args: Vec<String> = resolver
            .arguments("3.11", &request, Path::new("/tmp/t"), Path::new("/tmp/r.json"))
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "/opt/pip.pyz",
                "install",
                "-q",
                "six",
                "-r",
                "reqs.txt",
                "-c",
                "cons.txt",
                "--disable-pip-version-check",
                "--dry-run",
                "--ignore-installed",
                "--python-version=3.11",
                "--only-binary=:all:",
                "--target=/tmp/t",
                "--report",
                "/tmp/r.json",
                "--index-url",
                "https://mirror",
            ]
        );
    }

    #[test]
    fn test_resolve_reads_report() {
        let dir = TempDir::new().unwrap();
        let pip = dir.path().join("pip.pyz");
        fs::write(&pip, FAKE_PIP).unwrap();

        let request = ResolveRequest {
            packages: vec!["six".to_string()],
            ..Default::default()
        };
        let records = Resolver::new(&pip)
            .resolve(&shell_interpreter(), &request, dir.path())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "six");
    }

    #[test]
    fn test_resolve_failure_carries_output() {
        let dir = TempDir::new().unwrap();
        let pip = dir.path().join("pip.pyz");
        fs::write(&pip, "echo 'No matching distribution found for nope'\nexit 1\n").unwrap();

        let request = ResolveRequest {
            packages: vec!["nope".to_string()],
            ..Default::default()
        };
        let err = Resolver::new(&pip)
            .resolve(&shell_interpreter(), &request, dir.path())
            .unwrap_err();
        match err {
            Error::ResolutionError { command, output } => {
                assert!(command.contains("--dry-run"));
                assert!(command.contains("nope"));
                assert!(output.contains("No matching distribution"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_requested_extras() {
        let request = ResolveRequest {
            packages: vec![
                "Foo_Bar[test, doc]>=1".to_string(),
                "foo-bar[speed]".to_string(),
                "plain".to_string(),
                "./local/path.whl".to_string(),
            ],
            ..Default::default()
        };
        let extras = request.requested_extras();
        assert_eq!(extras.len(), 1);
        let foo: Vec<&str> = extras["foo-bar"].iter().map(String::as_str).collect();
        assert_eq!(foo, vec!["doc", "speed", "test"]);
    }
}
