// src/interpreter.rs

//! Resolving interpreter discovery

use crate::error::{Error, Result};
use crate::version::RezVersion;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Full version of the interpreter packages are resolved for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonVersion {
    version: RezVersion,
}

impl PythonVersion {
    pub fn parse(s: &str) -> Result<Self> {
        let version = RezVersion::parse(s.trim())?;
        if version.is_empty() {
            return Err(Error::ParseError("Empty interpreter version".to_string()));
        }
        Ok(Self { version })
    }

    /// `3.11.4`
    pub fn full(&self) -> String {
        self.version.to_string()
    }

    /// `3.11`
    pub fn short(&self) -> String {
        self.version.trim(2).to_string()
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}

/// An interpreter executable together with its version
#[derive(Debug, Clone)]
pub struct Interpreter {
    pub executable: PathBuf,
    pub version: PythonVersion,
}

impl Interpreter {
    /// Ask an interpreter executable for its version
    pub fn query(executable: &Path) -> Result<Self> {
        debug!("Querying interpreter version of {}", executable.display());

        let output = Command::new(executable)
            .args(["-c", "import platform; print(platform.python_version())"])
            .output()
            .map_err(|e| {
                Error::InitError(format!("Failed to run interpreter {}: {}", executable.display(), e))
            })?;

        if !output.status.success() {
            return Err(Error::InitError(format!(
                "Interpreter {} exited with {}: {}",
                executable.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = PythonVersion::parse(stdout.trim()).map_err(|e| {
            Error::InitError(format!(
                "Unexpected version output from {}: '{}' ({})",
                executable.display(),
                stdout.trim(),
                e
            ))
        })?;

        debug!("Interpreter {} is version {}", executable.display(), version);
        Ok(Self {
            executable: executable.to_path_buf(),
            version,
        })
    }
}
