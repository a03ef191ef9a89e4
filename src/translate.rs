// src/translate.rs

//! Upstream → target translation of names, versions and specifiers
//!
//! Version translation drops the epoch and folds every suffix into extra
//! dotted tokens:
//!
//! | upstream      | target       |
//! |---------------|--------------|
//! | `1.0a1`       | `1.0.a1`     |
//! | `1.0.post1`   | `1.0.post1`  |
//! | `1.0.dev1`    | `1.0.dev1`   |
//! | `1.0+abc.7`   | `1.0-abc.7`  |
//! | `1!2.3.4`     | `2.3.4`      |
//!
//! Specifiers are converted one by one and intersected. The conversion keeps
//! upstream semantics: `==1` matches `1.0` upstream, so it becomes `1+<1.1`
//! rather than the narrower target family `1`.
//!
//! | specifier | range      |
//! |-----------|------------|
//! | `==1`     | `1+<1.1`   |
//! | `==1.*`   | `1`        |
//! | `>1`      | `1.1+`     |
//! | `<1`      | `<1`       |
//! | `>=1`     | `1+`       |
//! | `<=1`     | `<1.1`     |
//! | `~=1.2`   | `1.2+<2`   |
//! | `~=1.2.3` | `1.2.3+<1.3` |
//! | `!=1`     | `<1\|1.1+` |
//! | `!=1.*`   | `<1\|2+`   |

use crate::error::{Error, Result};
use crate::version::{Operator, Pep440Version, RezVersion, Specifier, SpecifierSet, VersionRange};
use tracing::debug;

/// Translate a distribution name (`my-pkg` → `my_pkg`)
///
/// A `-` in a target name would start the version part.
pub fn translate_name(name: &str) -> String {
    name.replace('-', "_")
}

/// Canonical form of a distribution name used for comparisons
/// (`My.Package_name` → `my-package-name`)
pub fn canonicalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    out
}

/// Translate an upstream version string into a target version string
pub fn translate_version(version: &str) -> Result<String> {
    let parsed = Pep440Version::parse(version)?;

    let mut out = parsed
        .release
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(".");

    if let Some((phase, n)) = parsed.pre {
        out.push_str(&format!(".{}{}", phase.as_str(), n));
    }
    if let Some(n) = parsed.post {
        out.push_str(&format!(".post{}", n));
    }
    if let Some(n) = parsed.dev {
        out.push_str(&format!(".dev{}", n));
    }
    if let Some(local) = parsed.local_label() {
        out.push('-');
        out.push_str(&local);
    }

    Ok(out)
}

/// Whether the last dotted component is an integer
fn is_release(version: &str) -> bool {
    version
        .rsplit('.')
        .next()
        .is_some_and(|last| !last.is_empty() && last.parse::<u64>().is_ok())
}

fn replace_last(version: &str, last: &str) -> String {
    match version.rsplit_once('.') {
        Some((head, _)) => format!("{}.{}", head, last),
        None => last.to_string(),
    }
}

/// `1` → `2`, `1.2` → `1.3`, `1.a2` → `1.0`
fn next_ver(version: &str) -> String {
    if is_release(version) {
        let last = version.rsplit('.').next().unwrap_or("0");
        let bumped = last.parse::<u64>().map(|n| n + 1).unwrap_or(0);
        replace_last(version, &bumped.to_string())
    } else {
        replace_last(version, "0")
    }
}

/// `1` → `1.1`, `1.2` → `1.2.1`, `1.a2` → `1.0`
fn adjacent_ver(version: &str) -> String {
    if is_release(version) {
        format!("{}.1", version)
    } else {
        replace_last(version, "0")
    }
}

fn rez_version(s: &str) -> Result<RezVersion> {
    RezVersion::parse(s).map_err(|e| Error::ConversionError(format!("'{}' is not a valid target version: {}", s, e)))
}

/// Convert one specifier into a target range
pub fn translate_specifier(spec: &Specifier) -> Result<VersionRange> {
    if spec.operator == Operator::Arbitrary {
        return Err(Error::ConversionError(format!(
            "Don't know how to convert specifier '{}' into a target range",
            spec
        )));
    }

    let v = translate_version(spec.base_version())
        .map_err(|e| Error::ConversionError(format!("Cannot convert '{}': {}", spec, e)))?;
    let vnext = next_ver(&v);
    let vadj = adjacent_ver(&v);

    let range = match spec.operator {
        Operator::Equal if spec.is_wildcard() => VersionRange::family(rez_version(&v)?),
        Operator::Equal => VersionRange::between(rez_version(&v)?, rez_version(&vadj)?),
        Operator::GreaterEqual => VersionRange::at_least(rez_version(&v)?),
        Operator::Greater => VersionRange::at_least(rez_version(&vadj)?),
        Operator::LessEqual => VersionRange::below(rez_version(&vadj)?),
        Operator::Less => VersionRange::below(rez_version(&v)?),
        Operator::Compatible => {
            let parsed = rez_version(&v)?;
            if parsed.len() < 2 {
                return Err(Error::ConversionError(format!(
                    "'{}' needs at least two version components",
                    spec
                )));
            }
            let upper = next_ver(&parsed.trim(parsed.len() - 1).to_string());
            VersionRange::between(parsed, rez_version(&upper)?)
        }
        Operator::NotEqual if spec.is_wildcard() => {
            VersionRange::below(rez_version(&v)?).union(&VersionRange::at_least(rez_version(&vnext)?))
        }
        Operator::NotEqual => {
            VersionRange::below(rez_version(&v)?).union(&VersionRange::at_least(rez_version(&vadj)?))
        }
        Operator::Arbitrary => unreachable!(),
    };

    debug!("Converted specifier '{}' to '{}'", spec, range);
    Ok(range)
}

/// Convert a specifier set into the intersection of its converted ranges
///
/// An empty set converts to the unbounded range.
pub fn translate_specifier_set(specs: &SpecifierSet) -> Result<VersionRange> {
    let mut total = VersionRange::any();
    for spec in specs.iter() {
        total = total.intersection(&translate_specifier(spec)?);
        if total.is_empty() {
            return Err(Error::ConversionError(format!(
                "Specifier '{}' converts to a non-intersecting target range",
                specs
            )));
        }
    }
    Ok(total)
}

/// Parse and convert a specifier string (`">=1.0,<2"`)
pub fn translate_specifier_str(specs: &str) -> Result<VersionRange> {
    translate_specifier_set(&SpecifierSet::parse(specs)?)
}
