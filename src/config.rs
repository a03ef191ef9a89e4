// src/config.rs
//! Configuration file parsing
//!
//! Supports an optional TOML file with the following sections:
//! - top level - package repository paths, disabled hooks
//! - [system] - platform/arch/os overrides for host detection
//! - [pip] - resolver executable and extra arguments
//! - [fetch] - download timeout and user agent
//!
//! The file is looked up in order: an explicit path, `$REZPIP_CONFIG`,
//! `./rezpip.toml`. When none exists every value takes its default.

use crate::error::{Error, Result};
use crate::fetch::{FetchOptions, default_user_agent};
use crate::system::HostSystem;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "REZPIP_CONFIG";

/// Configuration file in the working directory
pub const LOCAL_CONFIG: &str = "rezpip.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Local package repository
    #[serde(default = "default_packages_path")]
    pub packages_path: PathBuf,

    /// Release package repository, used with `--release`
    #[serde(default)]
    pub release_packages_path: Option<PathBuf>,

    #[serde(default)]
    pub system: SystemSection,

    #[serde(default)]
    pub pip: PipSection,

    #[serde(default)]
    pub fetch: FetchSection,

    /// Hooks that are not registered
    #[serde(default)]
    pub disabled_hooks: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            packages_path: default_packages_path(),
            release_packages_path: None,
            system: SystemSection::default(),
            pip: PipSection::default(),
            fetch: FetchSection::default(),
            disabled_hooks: Vec::new(),
        }
    }
}

fn default_packages_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("packages")
}

/// Host detection overrides
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SystemSection {
    pub platform: Option<String>,
    pub arch: Option<String>,
    pub os: Option<String>,
}

/// Resolver settings
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipSection {
    /// Path to a `pip.pyz`
    pub executable: Option<PathBuf>,

    /// Appended to every resolver invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Download settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FetchSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            Error::ConfigError(format!("Failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Find and load the configuration
    ///
    /// An explicit path must exist; the implicit locations are optional.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        let local = Path::new(LOCAL_CONFIG);
        if local.is_file() {
            return Self::load(local);
        }
        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.fetch.timeout_secs == 0 {
            return Err(Error::ConfigError("fetch.timeout_secs must be positive".to_string()));
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(Error::ConfigError("fetch.user_agent must not be empty".to_string()));
        }
        if let Some(pip) = &self.pip.executable {
            if pip.extension().is_none_or(|ext| ext != "pyz") {
                return Err(Error::ConfigError(format!(
                    "pip.executable must be a .pyz file: {}",
                    pip.display()
                )));
            }
        }
        Ok(())
    }

    /// Detected host system with configured overrides applied
    pub fn host_system(&self) -> HostSystem {
        HostSystem::detect().with_overrides(
            self.system.platform.as_deref(),
            self.system.arch.as_deref(),
            self.system.os.as_deref(),
        )
    }

    pub fn fetch_options(&self, show_progress: bool) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            user_agent: self.fetch.user_agent.clone(),
            show_progress,
        }
    }

    /// Repository root for a run
    pub fn repository_path(&self, prefix: Option<&Path>, release: bool) -> Result<PathBuf> {
        if let Some(prefix) = prefix {
            return Ok(prefix.to_path_buf());
        }
        if release {
            return self.release_packages_path.clone().ok_or_else(|| {
                Error::ConfigError("--release requires release_packages_path to be configured".to_string())
            });
        }
        Ok(self.packages_path.clone())
    }
}
