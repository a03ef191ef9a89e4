// src/hooks/shiboken6.rs

//! shiboken6 support: some releases vendor a copy of the PySide6 core
//! package that would shadow the real one.

use super::Hook;
use crate::cleanup::CleanupAction;
use crate::error::Result;
use crate::install::Distribution;
use crate::translate::canonicalize_name;
use std::path::Path;

pub struct Shiboken6Hook;

impl Hook for Shiboken6Hook {
    fn name(&self) -> &str {
        "shiboken6"
    }

    fn description(&self) -> &str {
        "Remove the PySide6 copy shipped inside shiboken6 wheels"
    }

    fn cleanup(&self, dist: &Distribution, install_path: &Path) -> Result<Vec<CleanupAction>> {
        if canonicalize_name(&dist.name) != "shiboken6" {
            return Ok(Vec::new());
        }
        Ok(vec![CleanupAction::remove(install_path.join("python").join("PySide6"))])
    }
}
