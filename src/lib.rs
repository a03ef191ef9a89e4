// src/lib.rs

//! rezpip
//!
//! Converts Python packages resolved by pip into rez packages, keeping their
//! dependency semantics, platform variance and authorship metadata.
//!
//! # Architecture
//!
//! - Resolution is delegated to pip (`--dry-run --report`); its report becomes
//!   immutable [`ResolvedPackageRecord`]s
//! - Hooks validate the request, group records into packages and adjust
//!   installed files and final metadata
//! - Wheels are fetched concurrently, reusing verified cached copies
//! - Each group is installed, translated (versions, specifiers, markers) and
//!   published as one package with at most one variant per run

pub mod assemble;
pub mod cleanup;
pub mod config;
mod error;
pub mod fetch;
pub mod hash;
pub mod hooks;
pub mod install;
pub mod interpreter;
pub mod patch;
pub mod pipeline;
pub mod records;
pub mod repository;
pub mod requirement;
pub mod resolver;
pub mod rezreq;
pub mod system;
pub mod translate;
pub mod version;

pub use assemble::{TargetPackage, assemble};
pub use config::Config;
pub use error::{Error, Result};
pub use fetch::{FetchOptions, Fetcher};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use hooks::{Hook, HookRegistry};
pub use install::{Distribution, Installer, WheelInstaller};
pub use interpreter::{Interpreter, PythonVersion};
pub use pipeline::{Pipeline, RunOptions, RunSummary};
pub use records::{DownloadedArtifact, PackageGroup, ResolvedPackageRecord};
pub use repository::{FilesystemRepository, PackageRepository, PublishReport};
pub use requirement::TargetRequirement;
pub use resolver::{ResolveRequest, Resolver};
pub use system::{HostSystem, VariantAxis};
pub use translate::{translate_name, translate_specifier_set, translate_version};
