// src/version/specifier.rs

//! Upstream version specifiers (`>=1.0, !=1.3.*, <2`)

use super::pep440::Pep440Version;
use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static SPECIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(~=|===|==|!=|<=|>=|<|>)\s*([^\s,;]+)\s*$").unwrap());

/// Specifier comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `~=`
    Compatible,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<=`
    LessEqual,
    /// `>=`
    GreaterEqual,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `===`
    Arbitrary,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compatible => "~=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::Arbitrary => "===",
        }
    }

    /// Parse an operator token
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "~=" => Some(Self::Compatible),
            "==" => Some(Self::Equal),
            "!=" => Some(Self::NotEqual),
            "<=" => Some(Self::LessEqual),
            ">=" => Some(Self::GreaterEqual),
            "<" => Some(Self::Less),
            ">" => Some(Self::Greater),
            "===" => Some(Self::Arbitrary),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(operator, version)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    pub operator: Operator,
    /// Version text as written, including a trailing `.*` for prefix matches
    pub version: String,
}

impl Specifier {
    pub fn parse(s: &str) -> Result<Self> {
        let caps = SPECIFIER_RE
            .captures(s)
            .ok_or_else(|| Error::ParseError(format!("Invalid version specifier: '{}'", s)))?;
        let operator = Operator::parse(&caps[1])
            .ok_or_else(|| Error::ParseError(format!("Unknown operator in '{}'", s)))?;
        let version = caps[2].to_string();

        if version.ends_with(".*") && !matches!(operator, Operator::Equal | Operator::NotEqual) {
            return Err(Error::ParseError(format!(
                "Prefix match is only allowed with == and !=: '{}'",
                s
            )));
        }

        Ok(Self { operator, version })
    }

    /// Whether the specifier ends with `.*`
    pub fn is_wildcard(&self) -> bool {
        self.version.ends_with(".*")
    }

    /// Version text with any `.*` suffix removed
    pub fn base_version(&self) -> &str {
        self.version.strip_suffix(".*").unwrap_or(&self.version)
    }

    /// Check whether a candidate version satisfies this specifier
    ///
    /// Pre-release exclusion rules are not applied; marker evaluation only
    /// ever compares interpreter and platform versions.
    pub fn contains(&self, candidate: &Pep440Version) -> Result<bool> {
        if self.operator == Operator::Arbitrary {
            return Ok(candidate.to_string().eq_ignore_ascii_case(&self.version));
        }

        let spec = Pep440Version::parse(self.base_version())?;

        let result = match self.operator {
            Operator::Equal if self.is_wildcard() => prefix_match(candidate, &spec),
            Operator::NotEqual if self.is_wildcard() => !prefix_match(candidate, &spec),
            Operator::Equal => exact_match(candidate, &spec),
            Operator::NotEqual => !exact_match(candidate, &spec),
            Operator::LessEqual => candidate.public() <= spec,
            Operator::GreaterEqual => candidate.public() >= spec,
            Operator::Less => candidate.public() < spec,
            Operator::Greater => candidate.public() > spec,
            Operator::Compatible => {
                if spec.release.len() < 2 {
                    return Err(Error::ParseError(format!(
                        "'~=' needs at least two release segments: '{}'",
                        self
                    )));
                }
                let prefix = Pep440Version {
                    release: spec.release[..spec.release.len() - 1].to_vec(),
                    pre: None,
                    post: None,
                    dev: None,
                    local: None,
                    ..spec.clone()
                };
                candidate.public() >= spec && prefix_match(candidate, &prefix)
            }
            Operator::Arbitrary => unreachable!(),
        };
        Ok(result)
    }
}

fn exact_match(candidate: &Pep440Version, spec: &Pep440Version) -> bool {
    if spec.local.is_some() {
        candidate == spec
    } else {
        candidate.public() == *spec
    }
}

fn prefix_match(candidate: &Pep440Version, prefix: &Pep440Version) -> bool {
    if candidate.epoch != prefix.epoch {
        return false;
    }
    let len = prefix.release.len();
    candidate.padded_release(len)[..len] == prefix.release[..]
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator, self.version)
    }
}

/// A comma-separated conjunction of specifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpecifierSet {
    pub specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    /// Parse a comma-separated specifier list; empty input yields an empty set
    pub fn parse(s: &str) -> Result<Self> {
        let specifiers = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Specifier::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { specifiers })
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Specifier> {
        self.specifiers.iter()
    }

    /// Check whether a candidate satisfies every specifier
    pub fn contains(&self, candidate: &Pep440Version) -> Result<bool> {
        for spec in &self.specifiers {
            if !spec.contains(candidate)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}
