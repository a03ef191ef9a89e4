// src/system.rs

//! Host system description
//!
//! Variant-scoped packages carry one requirement per system axis
//! (`platform-linux`, `arch-x86_64`, `os-Ubuntu-22.04`). The same host facts
//! feed the marker environment used to evaluate requirement markers.

use crate::interpreter::PythonVersion;
use crate::requirement::MarkerEnvironment;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// A build dimension that produces a distinct variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantAxis {
    Platform,
    Arch,
    Os,
    Interpreter,
}

impl VariantAxis {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Arch => "arch",
            Self::Os => "os",
            Self::Interpreter => "interpreter",
        }
    }

    /// Axes that become system variant requirements, in emission order
    pub fn system_axes() -> &'static [VariantAxis] {
        &[VariantAxis::Platform, VariantAxis::Arch, VariantAxis::Os]
    }
}

impl fmt::Display for VariantAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Platform, architecture and OS of the machine packages are built for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSystem {
    /// `linux`, `osx` or `windows`
    pub platform: String,
    pub arch: String,
    pub os: String,
}

impl HostSystem {
    /// Detect the running host
    pub fn detect() -> Self {
        let platform = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        }
        .to_string();

        let arch = python_machine(std::env::consts::OS, std::env::consts::ARCH);
        let os = detect_os(&platform);

        debug!("Detected host system: platform={} arch={} os={}", platform, arch, os);
        Self { platform, arch, os }
    }

    /// Apply overrides from configuration
    pub fn with_overrides(
        mut self,
        platform: Option<&str>,
        arch: Option<&str>,
        os: Option<&str>,
    ) -> Self {
        if let Some(p) = platform {
            self.platform = p.to_string();
        }
        if let Some(a) = arch {
            self.arch = a.to_string();
        }
        if let Some(o) = os {
            self.os = o.to_string();
        }
        self
    }

    /// Host value of a system axis
    ///
    /// The interpreter axis is not a system requirement; interpreter pins are
    /// computed from the resolving interpreter instead.
    pub fn axis_value(&self, axis: VariantAxis) -> Option<&str> {
        match axis {
            VariantAxis::Platform => Some(&self.platform),
            VariantAxis::Arch => Some(&self.arch),
            VariantAxis::Os => Some(&self.os),
            VariantAxis::Interpreter => None,
        }
    }

    /// Marker environment for evaluating requirements against `python`
    pub fn marker_environment(&self, python: &PythonVersion) -> MarkerEnvironment {
        let (sys_platform, os_name, platform_system) = match self.platform.as_str() {
            "osx" => ("darwin", "posix", "Darwin"),
            "windows" => ("win32", "nt", "Windows"),
            "linux" => ("linux", "posix", "Linux"),
            other => (other, "posix", other),
        };

        MarkerEnvironment::new()
            .with("python_version", python.short())
            .with("python_full_version", python.full())
            .with("implementation_version", python.full())
            .with("implementation_name", "cpython")
            .with("platform_python_implementation", "CPython")
            .with("sys_platform", sys_platform)
            .with("os_name", os_name)
            .with("platform_system", platform_system)
            .with("platform_machine", self.arch.clone())
            .with("platform_release", "")
            .with("platform_version", "")
    }
}

/// Machine name as Python's `platform.machine()` reports it
fn python_machine(os: &str, arch: &str) -> String {
    match (os, arch) {
        ("macos", "aarch64") => "arm64".to_string(),
        ("windows", "x86_64") => "AMD64".to_string(),
        ("windows", "aarch64") => "ARM64".to_string(),
        (_, arch) => arch.to_string(),
    }
}

/// Distribution name and version (`Ubuntu-22.04`), or the platform name
fn detect_os(platform: &str) -> String {
    if platform == "linux" {
        if let Ok(content) = std::fs::read_to_string("/etc/os-release") {
            if let Some(os) = parse_os_release(&content) {
                return os;
            }
        }
    }
    platform.to_string()
}

fn parse_os_release(content: &str) -> Option<String> {
    let field = |key: &str| {
        content.lines().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|value| value.trim().trim_matches('"').to_string())
        })
    };

    let name = field("NAME")?;
    let name = name.split_whitespace().next()?.to_string();
    match field("VERSION_ID") {
        Some(version) => Some(format!("{}-{}", name, version)),
        None => Some(name),
    }
}
