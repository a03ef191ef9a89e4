// src/requirement/mod.rs

//! Upstream requirement parsing and normalization
//!
//! Requirements reach us in two shapes:
//!
//! - plain PEP 508 strings: `foo[bar] (>=1.0) ; python_version < "3.8"`
//! - structured records: `{requires: [...], extra: "doc", environment: "..."}`
//!
//! [`normalize_requirement`] turns both into [`CanonicalRequirement`]s whose
//! marker no longer mentions `extra`; the extras a requirement was gated on
//! are carried separately in `conditional_extras`.

pub mod marker;

pub use marker::{MarkerEnvironment, MarkerTree, convert_marker};

use crate::error::{Error, Result};
use crate::version::{RezVersion, SpecifierSet, VersionRange};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*").unwrap()
});

/// A requirement as declared by a distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRequirement {
    Plain(String),
    Structured(RequirementRecord),
}

impl From<&str> for RawRequirement {
    fn from(s: &str) -> Self {
        Self::Plain(s.to_string())
    }
}

/// Structured requirement block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementRecord {
    pub requires: Vec<String>,
    #[serde(default)]
    pub extra: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
}

/// A parsed PEP 508 requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequirement {
    pub name: String,
    /// Extras requested on the dependency itself (`foo[bar]`)
    pub extras: Vec<String>,
    pub specifier: SpecifierSet,
    pub url: Option<String>,
    pub marker: Option<MarkerTree>,
    /// Extras of the declaring distribution this requirement is gated on
    pub conditional_extras: Option<BTreeSet<String>>,
}

impl CanonicalRequirement {
    /// Parse a PEP 508 requirement string
    pub fn parse(s: &str) -> Result<Self> {
        let err = |what: &str| Error::ParseError(format!("Invalid requirement '{}': {}", s, what));

        let caps = NAME_RE.captures(s).ok_or_else(|| err("missing name"))?;
        let name = caps[1].to_string();
        let mut rest = &s[caps[0].len()..];

        let mut extras = Vec::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| err("unterminated extras"))?;
            extras = after[..close]
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
            rest = after[close + 1..].trim_start();
        }

        let mut url = None;
        let (spec_text, marker_text) = if let Some(after) = rest.strip_prefix('@') {
            let after = after.trim_start();
            // a URL runs to the first whitespace; a marker must follow " ;"
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            if end == 0 {
                return Err(err("empty URL"));
            }
            url = Some(after[..end].to_string());
            let tail = after[end..].trim_start();
            match tail.strip_prefix(';') {
                Some(marker) => ("", Some(marker)),
                None if tail.is_empty() => ("", None),
                None => return Err(err("unexpected text after URL")),
            }
        } else {
            match rest.split_once(';') {
                Some((spec, marker)) => (spec, Some(marker)),
                None => (rest, None),
            }
        };

        let spec_text = spec_text.trim();
        let spec_text = match spec_text.strip_prefix('(') {
            Some(inner) => inner
                .strip_suffix(')')
                .ok_or_else(|| err("unbalanced parentheses"))?,
            None => spec_text,
        };
        let specifier = SpecifierSet::parse(spec_text)?;

        let marker = match marker_text.map(str::trim) {
            Some("") => return Err(err("empty marker")),
            Some(text) => Some(MarkerTree::parse(text)?),
            None => None,
        };

        Ok(Self {
            name,
            extras,
            specifier,
            url,
            marker,
            conditional_extras: None,
        })
    }
}

impl fmt::Display for CanonicalRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        if let Some(url) = &self.url {
            write!(f, " @ {}", url)?;
        } else if !self.specifier.is_empty() {
            write!(f, " ({})", self.specifier)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, " ; {}", marker)?;
        }
        Ok(())
    }
}

/// Normalize a declared requirement into canonical requirements
///
/// Structured records expand to one requirement per `requires` entry. For
/// plain strings every `extra == '<name>'` comparison is moved out of the
/// marker into `conditional_extras`.
pub fn normalize_requirement(raw: &RawRequirement) -> Result<Vec<CanonicalRequirement>> {
    match raw {
        RawRequirement::Structured(record) => {
            let environment = record
                .environment
                .as_deref()
                .map(MarkerTree::parse)
                .transpose()?;
            let conditional = record.extra.as_ref().map(|e| BTreeSet::from([e.clone()]));

            record
                .requires
                .iter()
                .map(|req_str| {
                    let mut req = CanonicalRequirement::parse(req_str)?;
                    if environment.is_some() {
                        req.marker = environment.clone();
                    }
                    req.conditional_extras = conditional.clone();
                    Ok(req)
                })
                .collect()
        }
        RawRequirement::Plain(s) => {
            let mut req = CanonicalRequirement::parse(s)?;
            match req.marker.take() {
                Some(marker) if marker.references_extra() => {
                    let (residual, extras) = marker.extract_extras();
                    req.marker = residual;
                    req.conditional_extras = Some(extras);
                }
                other => req.marker = other,
            }
            Ok(vec![req])
        }
    }
}

/// A requirement in target syntax (`foo-1+<2`, `bar<1|1.1+`, `python`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRequirement {
    pub name: String,
    pub range: VersionRange,
}

impl TargetRequirement {
    pub fn new(name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }

    /// Requirement on any version of a package
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, VersionRange::any())
    }

    /// Requirement on a version family (`python-3.11`)
    pub fn family(name: impl Into<String>, version: &str) -> Result<Self> {
        Ok(Self::new(name, VersionRange::family(RezVersion::parse(version)?)))
    }
}

impl fmt::Display for TargetRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let range = self.range.to_string();
        match range.chars().next() {
            None => write!(f, "{}", self.name),
            Some('=' | '!' | '<' | '>') => write!(f, "{}{}", self.name, range),
            Some(_) => write!(f, "{}-{}", self.name, range),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_requirement() {
        let req = CanonicalRequirement::parse("Foo.Bar[baz, qux] (>=1.0,<2) ; python_version < '3.8'").unwrap();
        assert_eq!(req.name, "Foo.Bar");
        assert_eq!(req.extras, vec!["baz", "qux"]);
        assert_eq!(req.specifier.to_string(), ">=1.0,<2");
        assert!(req.marker.is_some());
        assert_eq!(
            req.to_string(),
            "Foo.Bar[baz,qux] (>=1.0,<2) ; python_version < \"3.8\""
        );
    }

    #[test]
    fn test_parse_bare_specifier_and_url() {
        let req = CanonicalRequirement::parse("requests>=2.0").unwrap();
        assert_eq!(req.name, "requests");
        assert_eq!(req.specifier.specifiers.len(), 1);

        let req = CanonicalRequirement::parse("pkg @ https://example.com/pkg.whl ; os_name == 'nt'").unwrap();
        assert_eq!(req.url.as_deref(), Some("https://example.com/pkg.whl"));
        assert!(req.specifier.is_empty());
        assert!(req.marker.is_some());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(CanonicalRequirement::parse("").is_err());
        assert!(CanonicalRequirement::parse("foo[bar").is_err());
        assert!(CanonicalRequirement::parse("foo (>=1").is_err());
        assert!(CanonicalRequirement::parse("foo ;").is_err());
        assert!(CanonicalRequirement::parse("foo @ ").is_err());
    }

    #[test]
    fn test_normalize_extra_only_marker() {
        let reqs = normalize_requirement(&"mypkg ; extra == 'dev'".into()).unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].name, "mypkg");
        assert!(reqs[0].marker.is_none());
        assert_eq!(reqs[0].conditional_extras, Some(BTreeSet::from(["dev".to_string()])));
    }

    #[test]
    fn test_normalize_keeps_residual_marker() {
        let reqs =
            normalize_requirement(&"foo>=1 ; python_version < '3.8' and extra == 'test'".into()).unwrap();
        assert_eq!(reqs[0].marker.as_ref().unwrap().to_string(), "python_version < \"3.8\"");
        assert_eq!(reqs[0].conditional_extras.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_normalize_without_extras() {
        let reqs = normalize_requirement(&"foo ; sys_platform == 'win32'".into()).unwrap();
        assert!(reqs[0].conditional_extras.is_none());
        assert!(reqs[0].marker.is_some());
    }

    #[test]
    fn test_normalize_structured() {
        let raw = RawRequirement::Structured(RequirementRecord {
            requires: vec!["sphinx>=4".to_string(), "furo".to_string()],
            extra: Some("doc".to_string()),
            environment: Some("python_version >= '3.8'".to_string()),
        });
        let reqs = normalize_requirement(&raw).unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[1].name, "furo");
        for req in &reqs {
            assert_eq!(req.conditional_extras, Some(BTreeSet::from(["doc".to_string()])));
            assert_eq!(req.marker.as_ref().unwrap().to_string(), "python_version >= \"3.8\"");
        }
    }

    #[test]
    fn test_raw_requirement_deserialize() {
        let plain: RawRequirement = serde_json::from_str("\"foo>=1\"").unwrap();
        assert_eq!(plain, RawRequirement::Plain("foo>=1".to_string()));

        let structured: RawRequirement =
            serde_json::from_str(r#"{"requires": ["bar"], "extra": "x"}"#).unwrap();
        assert!(matches!(structured, RawRequirement::Structured(ref r) if r.extra.as_deref() == Some("x")));
    }

    #[test]
    fn test_target_requirement_display() {
        let range = |s: &str| s.parse::<VersionRange>().unwrap();
        assert_eq!(TargetRequirement::new("foo", range("1+<2")).to_string(), "foo-1+<2");
        assert_eq!(TargetRequirement::new("foo", range("<1|1.1+")).to_string(), "foo<1|1.1+");
        assert_eq!(TargetRequirement::new("foo", range("==1")).to_string(), "foo==1");
        assert_eq!(TargetRequirement::any("python").to_string(), "python");
        assert_eq!(TargetRequirement::family("python", "3.11").unwrap().to_string(), "python-3.11");
    }
}
