// src/rezreq.rs

//! Requirements of one installed distribution, in target form
//!
//! [`rez_requirements`] walks a distribution's declared requirements and
//! decides, for each one, whether it applies to this conversion at all and
//! whether it belongs to the package or to its variant:
//!
//! 1. normalize the declared requirement
//! 2. drop it if its residual marker is false for the resolving interpreter
//! 3. drop it if it is gated on extras nobody activated
//! 4. move it to the variant if its marker depends on the host
//! 5. remap the name to its on-disk casing, translate the specifier
//!
//! System axes (`platform`, `arch`, `os`) and the interpreter requirement are
//! added last.

use crate::error::Result;
use crate::install::Distribution;
use crate::interpreter::PythonVersion;
use crate::requirement::{RawRequirement, TargetRequirement, convert_marker, normalize_requirement};
use crate::system::{HostSystem, VariantAxis};
use crate::translate::{canonicalize_name, translate_name, translate_specifier_set, translate_specifier_str};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Case-insensitive lookup from a distribution name to its on-disk casing
#[derive(Debug, Clone, Default)]
pub struct NameCasings {
    names: HashMap<String, String>,
}

impl NameCasings {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| (n.as_ref().to_lowercase(), n.as_ref().to_string()))
                .collect(),
        }
    }

    /// On-disk casing of `name`, or `name` itself when unknown
    pub fn remap(&self, name: &str) -> String {
        self.names
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// Everything a requirement translation depends on besides the distribution
#[derive(Debug, Clone, Copy)]
pub struct RequirementContext<'a> {
    pub python: &'a PythonVersion,
    pub host: &'a HostSystem,
    pub casings: &'a NameCasings,
    /// Extras requested by the user, keyed by canonical distribution name
    pub requested_extras: &'a BTreeMap<String, BTreeSet<String>>,
}

/// Target requirements of one distribution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RezRequirements {
    pub requires: Vec<TargetRequirement>,
    /// System requirements first (`platform`, `arch`, `os`), then the
    /// interpreter pin, then host-dependent requirements
    pub variant_requires: Vec<TargetRequirement>,
    pub is_pure: bool,
}

fn canonical_set<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    names.into_iter().map(canonicalize_name).collect()
}

/// Compute the target requirements of `dist`
pub fn rez_requirements(dist: &Distribution, ctx: &RequirementContext<'_>) -> Result<RezRequirements> {
    let env = ctx.host.marker_environment(ctx.python);
    let mut requires = Vec::new();
    let mut marker_variant_requires = Vec::new();

    let mut axes: BTreeSet<VariantAxis> = BTreeSet::new();
    // native code and generated launchers are platform specific
    if !dist.is_pure || !dist.entry_points.is_empty() {
        axes.extend([VariantAxis::Platform, VariantAxis::Arch]);
    }

    let provided = canonical_set(dist.provides_extra());
    let requested = ctx
        .requested_extras
        .get(&canonicalize_name(&dist.name))
        .map(|extras| canonical_set(extras.iter().map(String::as_str)))
        .unwrap_or_default();

    for raw in dist.requires() {
        for req in normalize_requirement(&RawRequirement::from(raw))? {
            if let Some(marker) = &req.marker {
                if !marker.evaluate(&env)? {
                    debug!("{}: skipping '{}', marker does not apply", dist.name, req);
                    continue;
                }
            }

            if let Some(conditional) = &req.conditional_extras {
                let conditional = canonical_set(conditional.iter().map(String::as_str));
                let active: Vec<&String> = conditional
                    .iter()
                    .filter(|e| provided.contains(*e) && requested.contains(*e))
                    .collect();
                if active.is_empty() {
                    debug!(
                        "{}: skipping '{}', extras {:?} were not requested",
                        dist.name, req, conditional
                    );
                    continue;
                }
                debug!("{}: '{}' enabled by extras {:?}", dist.name, req, active);
            }

            let mut to_variant = false;
            if let Some(marker) = &req.marker {
                let marker_axes = convert_marker(marker);
                if !marker_axes.is_empty() {
                    axes.extend(marker_axes);
                    to_variant = true;
                }
            }

            if !req.extras.is_empty() {
                warn!(
                    "{}: ignoring extras [{}] requested on {}",
                    dist.name,
                    req.extras.join(","),
                    req.name
                );
            }

            let name = translate_name(&ctx.casings.remap(&req.name));
            let target = TargetRequirement::new(name, translate_specifier_set(&req.specifier)?);
            if to_variant {
                marker_variant_requires.push(target);
            } else {
                requires.push(target);
            }
        }
    }

    let mut variant_requires = Vec::new();
    for axis in VariantAxis::system_axes() {
        if axes.contains(axis) {
            if let Some(value) = ctx.host.axis_value(*axis) {
                variant_requires.push(TargetRequirement::family(axis.name(), value)?);
            }
        }
    }

    if dist.is_pure {
        let python = match dist.requires_python() {
            Some(spec) => match translate_specifier_str(spec) {
                Ok(range) => TargetRequirement::new("python", range),
                Err(e) => {
                    warn!("{}: ignoring Requires-Python '{}': {}", dist.name, spec, e);
                    TargetRequirement::any("python")
                }
            },
            None => TargetRequirement::any("python"),
        };
        requires.push(python);
    } else {
        variant_requires.push(TargetRequirement::family("python", &ctx.python.short())?);
    }

    variant_requires.extend(marker_variant_requires);

    debug!(
        "{} requirements: requires [{}], variant [{}]",
        dist.name,
        join(&requires),
        join(&variant_requires)
    );

    Ok(RezRequirements {
        requires,
        variant_requires,
        is_pure: dist.is_pure,
    })
}

pub(crate) fn join(reqs: &[TargetRequirement]) -> String {
    reqs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::{CoreMetadata, EntryPoint};

    fn host() -> HostSystem {
        HostSystem {
            platform: "linux".to_string(),
            arch: "x86_64".to_string(),
            os: "Ubuntu-22.04".to_string(),
        }
    }

    fn dist(metadata: &str, is_pure: bool) -> Distribution {
        let mut d = Distribution::for_tests("demo", "1.0");
        d.metadata = CoreMetadata::parse(metadata);
        d.is_pure = is_pure;
        d
    }

    fn strings(reqs: &[TargetRequirement]) -> Vec<String> {
        reqs.iter().map(|r| r.to_string()).collect()
    }

    fn run(d: &Distribution, extras: &BTreeMap<String, BTreeSet<String>>) -> RezRequirements {
        let python = PythonVersion::parse("3.11.4").unwrap();
        let host = host();
        let casings = NameCasings::new(["PyYAML", "Foo-Bar"]);
        let ctx = RequirementContext {
            python: &python,
            host: &host,
            casings: &casings,
            requested_extras: extras,
        };
        rez_requirements(d, &ctx).unwrap()
    }

    #[test]
    fn test_pure_distribution() {
        let d = dist(
            "Name: demo\nVersion: 1.0\nRequires-Python: >=3.8\n\
             Requires-Dist: pyyaml (>=5.1)\n\
             Requires-Dist: foo-bar<2,>=1\n\
             Requires-Dist: typing-extensions ; python_version < '3.8'\n",
            true,
        );
        let reqs = run(&d, &BTreeMap::new());
        assert_eq!(strings(&reqs.requires), vec!["PyYAML-5.1+", "Foo_Bar-1+<2", "python-3.8+"]);
        assert!(reqs.variant_requires.is_empty());
        assert!(reqs.is_pure);
    }

    #[test]
    fn test_impure_distribution_pins_interpreter() {
        let d = dist("Name: demo\nVersion: 1.0\nRequires-Python: >=3.8\nRequires-Dist: numpy\n", false);
        let reqs = run(&d, &BTreeMap::new());
        assert_eq!(strings(&reqs.requires), vec!["numpy"]);
        assert_eq!(
            strings(&reqs.variant_requires),
            vec!["platform-linux", "arch-x86_64", "python-3.11"]
        );
    }

    #[test]
    fn test_marker_moves_requirement_to_variant() {
        let d = dist(
            "Name: demo\nVersion: 1.0\n\
             Requires-Dist: pywin32 ; sys_platform == 'win32'\n\
             Requires-Dist: uvloop ; sys_platform == 'linux'\n",
            true,
        );
        let reqs = run(&d, &BTreeMap::new());
        assert_eq!(strings(&reqs.requires), vec!["python"]);
        assert_eq!(strings(&reqs.variant_requires), vec!["platform-linux", "uvloop"]);
    }

    #[test]
    fn test_entry_points_force_platform_and_arch() {
        let mut d = dist("Name: demo\nVersion: 1.0\n", true);
        d.entry_points.push(EntryPoint {
            name: "demo".to_string(),
            value: "demo:main".to_string(),
            group: "console_scripts".to_string(),
        });
        let reqs = run(&d, &BTreeMap::new());
        assert_eq!(strings(&reqs.variant_requires), vec!["platform-linux", "arch-x86_64"]);
        assert_eq!(strings(&reqs.requires), vec!["python"]);
    }

    #[test]
    fn test_conditional_extras() {
        let d = dist(
            "Name: demo\nVersion: 1.0\nProvides-Extra: test\nProvides-Extra: doc\n\
             Requires-Dist: pytest ; extra == 'test'\n\
             Requires-Dist: sphinx ; extra == 'doc'\n\
             Requires-Dist: hypothesis ; extra == 'undeclared'\n",
            true,
        );

        let none = run(&d, &BTreeMap::new());
        assert_eq!(strings(&none.requires), vec!["python"]);

        let extras = BTreeMap::from([(
            "demo".to_string(),
            BTreeSet::from(["test".to_string(), "undeclared".to_string()]),
        )]);
        let with_test = run(&d, &extras);
        assert_eq!(strings(&with_test.requires), vec!["pytest", "python"]);
    }

    #[test]
    fn test_name_casings() {
        let casings = NameCasings::new(["PyYAML"]);
        assert_eq!(casings.remap("pyyaml"), "PyYAML");
        assert_eq!(casings.remap("PYYAML"), "PyYAML");
        assert_eq!(casings.remap("other"), "other");
    }
}
