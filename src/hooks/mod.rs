// src/hooks/mod.rs

//! Hook pipeline
//!
//! Hooks let package-specific knowledge intervene at fixed points of a run:
//!
//! | extension point    | when                              | may            |
//! |--------------------|-----------------------------------|----------------|
//! | `pre_pip_resolve`  | before the resolver runs          | veto           |
//! | `post_pip_resolve` | after the report is parsed        | veto           |
//! | `group_packages`   | before fetching                   | claim records  |
//! | `cleanup`          | after each wheel is installed     | remove files   |
//! | `patches`          | after cleanup                     | patch files    |
//! | `metadata`         | after a package is assembled      | edit package   |
//!
//! Every extension point has a no-op default, so a hook only implements what
//! it needs. The [`HookRegistry`] calls hooks synchronously in registration
//! order, built-ins first; the first error aborts the remaining hooks.
//!
//! # Grouping
//!
//! Each `group_packages` call receives the records not yet claimed by an
//! earlier hook and returns groups of indices into that slice. The registry
//! removes claimed records before calling the next hook, and every record
//! left over at the end becomes a group of its own.

mod pyside6;
mod shiboken6;

pub use pyside6::PySide6Hook;
pub use shiboken6::Shiboken6Hook;

use crate::assemble::TargetPackage;
use crate::cleanup::{self, CleanupAction};
use crate::error::{Error, Result};
use crate::install::Distribution;
use crate::patch;
use crate::records::{PackageGroup, ResolvedPackageRecord};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// An extension participating in a conversion run
pub trait Hook: Send + Sync {
    /// Unique name, also used to disable the hook from configuration
    fn name(&self) -> &str;

    /// One line shown by `--list-hooks`
    fn description(&self) -> &str {
        ""
    }

    /// Validate the user's request; must not change it
    fn pre_pip_resolve(&self, _packages: &[String], _requirement_files: &[PathBuf]) -> Result<()> {
        Ok(())
    }

    /// Validate the resolved records
    fn post_pip_resolve(&self, _records: &[ResolvedPackageRecord]) -> Result<()> {
        Ok(())
    }

    /// Claim records that must become one package
    ///
    /// Returns groups of indices into `records`.
    fn group_packages(&self, _records: &[ResolvedPackageRecord]) -> Result<Vec<Vec<usize>>> {
        Ok(Vec::new())
    }

    /// Absolute paths of patch files to apply to an installed distribution
    fn patches(&self, _dist: &Distribution, _install_path: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Files to remove from an installed distribution
    fn cleanup(&self, _dist: &Distribution, _install_path: &Path) -> Result<Vec<CleanupAction>> {
        Ok(Vec::new())
    }

    /// Final adjustments to an assembled package
    fn metadata(&self, _package: &mut TargetPackage) -> Result<()> {
        Ok(())
    }
}

/// Ordered collection of hooks
#[derive(Clone)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookRegistry {
    /// Create a registry without any hooks
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Create a registry with the built-in hooks
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PySide6Hook));
        registry.register(Arc::new(Shiboken6Hook));
        registry
    }

    /// Append a hook; it runs after every hook registered before it
    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        debug!("Registering hook {}", hook.name());
        self.hooks.push(hook);
    }

    /// Remove hooks by name
    pub fn disable(&mut self, names: &[String]) {
        self.hooks.retain(|hook| {
            let keep = !names.iter().any(|n| n == hook.name());
            if !keep {
                debug!("Hook {} disabled by configuration", hook.name());
            }
            keep
        });
    }

    pub fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.hooks
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn pre_pip_resolve(&self, packages: &[String], requirement_files: &[PathBuf]) -> Result<()> {
        for hook in &self.hooks {
            debug!("Calling {}.pre_pip_resolve", hook.name());
            hook.pre_pip_resolve(packages, requirement_files)?;
        }
        Ok(())
    }

    pub fn post_pip_resolve(&self, records: &[ResolvedPackageRecord]) -> Result<()> {
        for hook in &self.hooks {
            debug!("Calling {}.post_pip_resolve", hook.name());
            hook.post_pip_resolve(records)?;
        }
        Ok(())
    }

    /// Partition records into groups
    ///
    /// Every input record ends up in exactly one returned group; groups
    /// claimed by hooks come first, in hook order, followed by one singleton
    /// group per unclaimed record in report order.
    pub fn group_packages(
        &self,
        records: Vec<ResolvedPackageRecord>,
    ) -> Result<Vec<PackageGroup<ResolvedPackageRecord>>> {
        let mut remaining = records;
        let mut groups = Vec::new();

        for hook in &self.hooks {
            if remaining.is_empty() {
                break;
            }
            let claims = hook.group_packages(&remaining)?;

            let mut seen = BTreeSet::new();
            for index in claims.iter().flatten() {
                if *index >= remaining.len() {
                    return Err(Error::hook(
                        hook.name(),
                        format!("claimed record {} of {}", index, remaining.len()),
                    ));
                }
                if !seen.insert(*index) {
                    return Err(Error::hook(
                        hook.name(),
                        format!("claimed record '{}' twice", remaining[*index].name),
                    ));
                }
            }

            let mut slots: Vec<Option<ResolvedPackageRecord>> = remaining.into_iter().map(Some).collect();
            for claim in claims.into_iter().filter(|c| !c.is_empty()) {
                let members: Vec<ResolvedPackageRecord> =
                    claim.into_iter().filter_map(|i| slots[i].take()).collect();
                debug!(
                    "{} grouped {}",
                    hook.name(),
                    members.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(" + ")
                );
                groups.push(PackageGroup::new(members));
            }
            remaining = slots.into_iter().flatten().collect();
        }

        groups.extend(remaining.into_iter().map(|r| PackageGroup::new(vec![r])));
        Ok(groups)
    }

    /// Collect patches from every hook, in hook order
    pub fn patches(&self, dist: &Distribution, install_path: &Path) -> Result<Vec<PathBuf>> {
        let mut patches = Vec::new();
        for hook in &self.hooks {
            patches.extend(hook.patches(dist, install_path)?);
        }
        Ok(patches)
    }

    /// Apply every hook's patches to an installed distribution
    pub fn patch(&self, dist: &Distribution, install_path: &Path) -> Result<()> {
        let patches = self.patches(dist, install_path)?;
        patch::apply_patches(&dist.name, &patches, install_path)
    }

    /// Run every hook's cleanup actions against an installed distribution
    ///
    /// Removed paths are dropped from the distribution's file manifest.
    pub fn cleanup(&self, dist: &mut Distribution, install_path: &Path) -> Result<Vec<PathBuf>> {
        let mut actions = Vec::new();
        for hook in &self.hooks {
            actions.extend(hook.cleanup(dist, install_path)?);
        }
        if actions.is_empty() {
            return Ok(Vec::new());
        }

        let removed = cleanup::execute(&actions, install_path)?;
        dist.remove_files(&removed);
        Ok(removed)
    }

    pub fn metadata(&self, package: &mut TargetPackage) -> Result<()> {
        for hook in &self.hooks {
            debug!("Calling {}.metadata", hook.name());
            hook.metadata(package)?;
        }
        Ok(())
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::records::{ArchiveInfo, DownloadInfo};

    pub(crate) fn record(name: &str) -> ResolvedPackageRecord {
        ResolvedPackageRecord {
            name: name.to_string(),
            version: "1.0".to_string(),
            download_info: DownloadInfo {
                url: format!("https://files.example/{}-1.0-py3-none-any.whl", name),
                archive_info: ArchiveInfo::default(),
            },
            is_direct: false,
            requested: false,
            metadata: serde_json::Map::new(),
        }
    }

    /// Claims every record whose name starts with a prefix
    struct PrefixHook(&'static str);

    impl Hook for PrefixHook {
        fn name(&self) -> &str {
            self.0
        }

        fn group_packages(&self, records: &[ResolvedPackageRecord]) -> Result<Vec<Vec<usize>>> {
            let claimed: Vec<usize> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.name.starts_with(self.0))
                .map(|(i, _)| i)
                .collect();
            Ok(vec![claimed])
        }
    }

    struct DoubleClaim;

    impl Hook for DoubleClaim {
        fn name(&self) -> &str {
            "double"
        }

        fn group_packages(&self, _records: &[ResolvedPackageRecord]) -> Result<Vec<Vec<usize>>> {
            Ok(vec![vec![0], vec![0]])
        }
    }

    struct Veto;

    impl Hook for Veto {
        fn name(&self) -> &str {
            "veto"
        }

        fn pre_pip_resolve(&self, _packages: &[String], _files: &[PathBuf]) -> Result<()> {
            Err(Error::hook(self.name(), "nope"))
        }
    }

    fn names(groups: &[PackageGroup<ResolvedPackageRecord>]) -> Vec<Vec<&str>> {
        groups.iter().map(|g| g.names()).collect()
    }

    #[test]
    fn test_grouping_claims_and_leftovers() {
        let mut registry = HookRegistry::new();
        registry.register(Arc::new(PrefixHook("a")));
        registry.register(Arc::new(PrefixHook("ab")));
        registry.register(Arc::new(PrefixHook("zzz")));

        let records = ["b", "a1", "ab1", "c", "a2"].map(record).to_vec();
        let groups = registry.group_packages(records).unwrap();

        // "ab1" was already claimed by the first hook; "zzz" claims nothing
        assert_eq!(names(&groups), vec![vec!["a1", "ab1", "a2"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn test_grouping_is_a_partition() {
        let registry = HookRegistry::with_builtins();
        let input = ["shiboken6", "PySide6_Addons", "six", "PySide6", "numpy", "PySide6-Essentials"];
        let groups = registry.group_packages(input.map(record).to_vec()).unwrap();

        let mut all: Vec<&str> = groups.iter().flat_map(|g| g.names()).collect();
        all.sort();
        let mut expected = input.to_vec();
        expected.sort();
        assert_eq!(all, expected);
        assert!(groups.iter().all(|g| !g.is_empty()));
        assert_eq!(groups[0].names()[0], "PySide6");
    }

    #[test]
    fn test_double_claim_is_rejected() {
        let mut registry = HookRegistry::new();
        registry.register(Arc::new(DoubleClaim));
        let err = registry.group_packages(vec![record("a")]).unwrap_err();
        assert!(matches!(err, Error::HookError { ref hook, .. } if hook == "double"));
    }

    #[test]
    fn test_veto_stops_later_hooks() {
        let mut registry = HookRegistry::new();
        registry.register(Arc::new(Veto));
        let err = registry.pre_pip_resolve(&["x".to_string()], &[]).unwrap_err();
        assert!(matches!(err, Error::HookError { .. }));
    }

    #[test]
    fn test_disable() {
        let mut registry = HookRegistry::with_builtins();
        assert_eq!(registry.len(), 2);
        registry.disable(&["shiboken6".to_string()]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.hooks()[0].name(), "pyside6");
    }
}
