// src/hooks/pyside6.rs

//! PySide6 support
//!
//! Since 6.3, PySide6 is split into `PySide6`, `PySide6-Essentials` and
//! `PySide6-Addons`, which install into the same Python package and only make
//! sense together. They are merged into one target package, and neither half
//! may be installed without `PySide6` itself. Some releases also ship stray
//! `shiboken6` directories that would shadow the real `shiboken6` package.

use super::Hook;
use crate::cleanup::CleanupAction;
use crate::error::{Error, Result};
use crate::install::Distribution;
use crate::records::ResolvedPackageRecord;
use crate::requirement::CanonicalRequirement;
use crate::translate::canonicalize_name;
use std::path::{Path, PathBuf};

const PYSIDE6: &str = "pyside6";

/// Group members in package order
const MEMBERS: &[&str] = &[PYSIDE6, "pyside6-essentials", "pyside6-addons"];

fn member_rank(name: &str) -> Option<usize> {
    let canonical = canonicalize_name(name);
    MEMBERS.iter().position(|m| *m == canonical)
}

/// Names of requested/resolved halves when `PySide6` itself is missing
fn orphaned_halves<'a>(names: impl Iterator<Item = &'a str>) -> Option<Vec<&'a str>> {
    let mut seen_pyside6 = false;
    let mut halves = Vec::new();
    for name in names {
        match member_rank(name) {
            Some(0) => seen_pyside6 = true,
            Some(_) => halves.push(name),
            None => {}
        }
    }
    (!halves.is_empty() && !seen_pyside6).then_some(halves)
}

pub struct PySide6Hook;

impl Hook for PySide6Hook {
    fn name(&self) -> &str {
        "pyside6"
    }

    fn description(&self) -> &str {
        "Merge PySide6, PySide6-Essentials and PySide6-Addons into one package"
    }

    fn pre_pip_resolve(&self, packages: &[String], _requirement_files: &[PathBuf]) -> Result<()> {
        let parsed: Vec<CanonicalRequirement> = packages
            .iter()
            .filter_map(|p| CanonicalRequirement::parse(p).ok())
            .collect();

        if let Some(halves) = orphaned_halves(parsed.iter().map(|r| r.name.as_str())) {
            let names = halves.join(" and ");
            let verb = if halves.len() == 1 { "was" } else { "were" };
            return Err(Error::hook(
                self.name(),
                format!(
                    "{names} {verb} requested but PySide6 was not. \
                     You must explicitly request PySide6 in addition to {names}."
                ),
            ));
        }
        Ok(())
    }

    fn post_pip_resolve(&self, records: &[ResolvedPackageRecord]) -> Result<()> {
        if let Some(halves) = orphaned_halves(records.iter().map(|r| r.name.as_str())) {
            let names = halves.join(" and ");
            let verb = if halves.len() == 1 { "is" } else { "are" };
            return Err(Error::hook(
                self.name(),
                format!(
                    "{names} {verb} part of the resolved packages but PySide6 was not. \
                     Request PySide6 explicitly in addition to {names}."
                ),
            ));
        }
        Ok(())
    }

    fn group_packages(&self, records: &[ResolvedPackageRecord]) -> Result<Vec<Vec<usize>>> {
        let mut claimed: Vec<(usize, usize)> = records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| member_rank(&r.name).map(|rank| (rank, i)))
            .collect();
        if claimed.is_empty() {
            return Ok(Vec::new());
        }

        claimed.sort();
        Ok(vec![claimed.into_iter().map(|(_, i)| i).collect()])
    }

    fn cleanup(&self, dist: &Distribution, install_path: &Path) -> Result<Vec<CleanupAction>> {
        if member_rank(&dist.name).is_none() {
            return Ok(Vec::new());
        }

        Ok(vec![
            CleanupAction::remove(install_path.join("python").join("shiboken6")),
            CleanupAction::remove(install_path.join("python").join("shiboken6_generator")),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::tests::record;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pre_resolve_requires_pyside6() {
        let hook = PySide6Hook;
        assert!(hook.pre_pip_resolve(&strings(&["PySide6", "PySide6-Addons"]), &[]).is_ok());
        assert!(hook.pre_pip_resolve(&strings(&["six"]), &[]).is_ok());

        let err = hook
            .pre_pip_resolve(&strings(&["pyside6_essentials>=6.5", "PySide6-Addons"]), &[])
            .unwrap_err();
        match err {
            Error::HookError { hook, message } => {
                assert_eq!(hook, "pyside6");
                assert!(message.starts_with("pyside6_essentials and PySide6-Addons were requested"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_post_resolve_requires_pyside6() {
        let hook = PySide6Hook;
        let err = hook.post_pip_resolve(&[record("PySide6-Addons"), record("shiboken6")]).unwrap_err();
        assert!(matches!(err, Error::HookError { ref message, .. } if message.contains(" is part of")));
        assert!(hook.post_pip_resolve(&[record("PySide6-Addons"), record("PySide6")]).is_ok());
    }

    #[test]
    fn test_group_orders_pyside6_first() {
        let records = [record("PySide6-Addons"), record("six"), record("PySide6_Essentials"), record("pyside6")];
        let groups = PySide6Hook.group_packages(&records).unwrap();
        assert_eq!(groups, vec![vec![3, 2, 0]]);
        assert!(PySide6Hook.group_packages(&[record("six")]).unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_targets_stray_shiboken() {
        let root = Path::new("/work/installed/PySide6");
        let actions = PySide6Hook
            .cleanup(&Distribution::for_tests("PySide6_Addons", "6.5.0"), root)
            .unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].path, root.join("python/shiboken6"));

        let none = PySide6Hook
            .cleanup(&Distribution::for_tests("shiboken6", "6.5.0"), root)
            .unwrap();
        assert!(none.is_empty());
    }
}
