// src/pipeline.rs

//! Conversion run orchestration
//!
//! A run resolves the request once per interpreter and turns every resolved
//! group into one published package:
//!
//! ```text
//! query interpreter -> pre_pip_resolve -> resolve -> post_pip_resolve
//!   -> group_packages -> fetch -> install + cleanup + patch (per member)
//!   -> assemble -> publish
//! ```
//!
//! Downloads and installs live in a per-run work area that is removed when
//! the run ends, successful or not, unless it is explicitly retained.

use crate::assemble::assemble;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::hooks::HookRegistry;
use crate::install::{Distribution, Installer, WheelInstaller};
use crate::interpreter::Interpreter;
use crate::records::{DownloadedArtifact, PackageGroup};
use crate::repository::{PackageRepository, PublishReport};
use crate::resolver::{ResolveRequest, Resolver};
use crate::rezreq::{NameCasings, RequirementContext};
use crate::system::HostSystem;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What one run converts
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub request: ResolveRequest,
    /// Interpreter executables, each resolved independently
    pub interpreters: Vec<PathBuf>,
    /// Path to a `pip.pyz`
    pub pip: PathBuf,
    /// Leave the work area on disk after the run
    pub keep_tmp_dirs: bool,
}

impl RunOptions {
    /// Check the options without touching the work area
    pub fn validate(&self) -> Result<()> {
        if self.request.is_empty() {
            return Err(Error::ConfigError(
                "no packages or requirement files given".to_string(),
            ));
        }
        if self.interpreters.is_empty() {
            return Err(Error::ConfigError("no python interpreter given".to_string()));
        }
        if self.pip.extension().is_none_or(|ext| ext != "pyz") {
            return Err(Error::ConfigError(format!(
                "pip must be a .pyz file: {}",
                self.pip.display()
            )));
        }
        if !self.pip.is_file() {
            return Err(Error::NotFoundError(format!("pip not found: {}", self.pip.display())));
        }
        for file in self
            .request
            .requirement_files
            .iter()
            .chain(&self.request.constraint_files)
        {
            if !file.is_file() {
                return Err(Error::NotFoundError(format!(
                    "requirements file not found: {}",
                    file.display()
                )));
            }
        }
        Ok(())
    }
}

/// A package written by a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPackage {
    pub name: String,
    pub version: String,
    pub python: String,
    pub report: PublishReport,
}

/// Result of a complete run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub packages: Vec<PublishedPackage>,
    /// Retained work area, when requested
    pub work_dir: Option<PathBuf>,
}

/// Wires the conversion phases together
pub struct Pipeline {
    hooks: HookRegistry,
    host: HostSystem,
    fetcher: Fetcher,
    installer: Box<dyn Installer>,
    repository: Box<dyn PackageRepository>,
}

impl Pipeline {
    pub fn new(
        hooks: HookRegistry,
        host: HostSystem,
        fetcher: Fetcher,
        repository: Box<dyn PackageRepository>,
    ) -> Self {
        Self {
            hooks,
            host,
            fetcher,
            installer: Box::new(WheelInstaller::new()),
            repository,
        }
    }

    pub fn with_installer(mut self, installer: Box<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Run the whole conversion
    pub fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        options.validate()?;

        let work = tempfile::Builder::new().prefix("rezpip-").tempdir()?;
        info!("Using work area {}", work.path().display());

        let result = options
            .interpreters
            .iter()
            .map(|exe| Interpreter::query(exe))
            .collect::<Result<Vec<_>>>()
            .and_then(|interpreters| {
                let resolver = Resolver::new(&options.pip);
                let mut packages = Vec::new();
                for interpreter in &interpreters {
                    packages.extend(self.convert(interpreter, &resolver, &options.request, work.path())?);
                }
                Ok(packages)
            });

        let work_dir = if options.keep_tmp_dirs {
            let kept = work.keep();
            info!("Keeping work area {}", kept.display());
            Some(kept)
        } else {
            None
        };

        Ok(RunSummary {
            packages: result?,
            work_dir,
        })
    }

    /// Convert `request` for one interpreter, using `work_dir` as work area
    pub fn convert(
        &self,
        interpreter: &Interpreter,
        resolver: &Resolver,
        request: &ResolveRequest,
        work_dir: &Path,
    ) -> Result<Vec<PublishedPackage>> {
        let python = interpreter.version.short();
        let wheels = work_dir.join("wheels");
        let install_root = work_dir.join("installed").join(&python);
        fs::create_dir_all(&wheels)?;
        fs::create_dir_all(&install_root)?;

        self.hooks
            .pre_pip_resolve(&request.packages, &request.requirement_files)?;
        let records = resolver.resolve(interpreter, request, work_dir)?;
        self.hooks.post_pip_resolve(&records)?;

        if records.is_empty() {
            warn!("Nothing to install for python {}", python);
            return Ok(Vec::new());
        }

        let groups = self.hooks.group_packages(records)?;
        let groups = self.fetcher.fetch(groups, &wheels)?;

        let installed = groups
            .into_iter()
            .map(|group| self.install_group(group, &install_root))
            .collect::<Result<Vec<_>>>()?;

        let requested_extras = request.requested_extras();
        self.publish_groups(&installed, &install_root, interpreter, &requested_extras)
            .map(|packages| {
                packages
                    .into_iter()
                    .map(|(name, version, report)| PublishedPackage {
                        name,
                        version,
                        python: python.clone(),
                        report,
                    })
                    .collect()
            })
    }

    /// Install every member of a group, then clean up and patch it
    fn install_group(
        &self,
        mut group: PackageGroup<DownloadedArtifact>,
        install_root: &Path,
    ) -> Result<PackageGroup<DownloadedArtifact>> {
        let dists = group
            .records()
            .iter()
            .map(|artifact| {
                let target = install_root.join(&artifact.record.name);
                let mut dist: Distribution = self.installer.install(artifact, &target)?;
                let removed = self.hooks.cleanup(&mut dist, &target)?;
                if !removed.is_empty() {
                    info!("Removed {} paths from {}", removed.len(), dist.name);
                }
                self.hooks.patch(&dist, &target)?;
                Ok(dist)
            })
            .collect::<Result<Vec<_>>>()?;

        for dist in dists {
            group.push_distribution(dist)?;
        }
        Ok(group)
    }

    fn publish_groups(
        &self,
        groups: &[PackageGroup<DownloadedArtifact>],
        install_root: &Path,
        interpreter: &Interpreter,
        requested_extras: &BTreeMap<String, BTreeSet<String>>,
    ) -> Result<Vec<(String, String, PublishReport)>> {
        let casings = NameCasings::new(
            groups
                .iter()
                .flat_map(|g| g.distributions().iter().map(|d| d.name.as_str())),
        );
        let ctx = RequirementContext {
            python: &interpreter.version,
            host: &self.host,
            casings: &casings,
            requested_extras,
        };

        groups
            .iter()
            .map(|group| {
                let package = assemble(group, install_root, &ctx, &self.hooks)?;
                let report = self
                    .repository
                    .publish(&package, &mut |root: &Path| -> Result<()> { package.materialize(root) })?;
                Ok((package.name, package.version, report))
            })
            .collect()
    }
}
