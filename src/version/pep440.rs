// src/version/pep440.rs

//! Upstream (PEP 440) version parsing and ordering
//!
//! Accepts every spelling the Python packaging ecosystem accepts
//! (`1.0alpha1`, `1.0-r2`, `v1.0.DEV`) and normalizes it:
//!
//! - "1.0a1" → release=[1, 0], pre=(a, 1)
//! - "1!2.3.4" → epoch=1, release=[2, 3, 4]
//! - "1.0+Ubuntu-1" → release=[1, 0], local=[ubuntu, 1]

use crate::error::{Error, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^\s*
        v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?P<pre>
            [-_.]?
            (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
            [-_.]?
            (?P<pre_n>[0-9]+)?
        )?
        (?P<post>
            (?:-(?P<post_n1>[0-9]+))
            |
            (?:
                [-_.]?
                (?P<post_l>post|rev|r)
                [-_.]?
                (?P<post_n2>[0-9]+)?
            )
        )?
        (?P<dev>
            [-_.]?
            (?P<dev_l>dev)
            [-_.]?
            (?P<dev_n>[0-9]+)?
        )?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$",
    )
    .unwrap()
});

/// Pre-release phase after normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrePhase {
    Alpha,
    Beta,
    ReleaseCandidate,
}

impl PrePhase {
    fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "a" | "alpha" => Self::Alpha,
            "b" | "beta" => Self::Beta,
            _ => Self::ReleaseCandidate,
        }
    }

    /// Normalized spelling (`a`, `b` or `rc`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::ReleaseCandidate => "rc",
        }
    }
}

/// One dot-separated part of a local version label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalSegment {
    Number(u64),
    Text(String),
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            // alphanumeric segments sort before numeric ones
            (Self::Text(_), Self::Number(_)) => Ordering::Less,
            (Self::Number(_), Self::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed upstream version
#[derive(Debug, Clone, Eq, Hash)]
pub struct Pep440Version {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PrePhase, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Option<Vec<LocalSegment>>,
}

fn parse_number(s: &str, input: &str) -> Result<u64> {
    s.parse::<u64>()
        .map_err(|e| Error::ParseError(format!("Invalid number '{}' in version '{}': {}", s, input, e)))
}

impl Pep440Version {
    /// Parse a version string
    pub fn parse(s: &str) -> Result<Self> {
        let caps = VERSION_RE
            .captures(s)
            .ok_or_else(|| Error::ParseError(format!("Invalid version: '{}'", s)))?;

        let epoch = match caps.name("epoch") {
            Some(m) => parse_number(m.as_str(), s)?,
            None => 0,
        };

        let release = caps["release"]
            .split('.')
            .map(|part| parse_number(part, s))
            .collect::<Result<Vec<_>>>()?;

        let pre = match caps.name("pre_l") {
            Some(l) => {
                let n = match caps.name("pre_n") {
                    Some(n) => parse_number(n.as_str(), s)?,
                    None => 0,
                };
                Some((PrePhase::parse(l.as_str()), n))
            }
            None => None,
        };

        let post = if let Some(n) = caps.name("post_n1") {
            Some(parse_number(n.as_str(), s)?)
        } else if caps.name("post_l").is_some() {
            match caps.name("post_n2") {
                Some(n) => Some(parse_number(n.as_str(), s)?),
                None => Some(0),
            }
        } else {
            None
        };

        let dev = match caps.name("dev_l") {
            Some(_) => match caps.name("dev_n") {
                Some(n) => Some(parse_number(n.as_str(), s)?),
                None => Some(0),
            },
            None => None,
        };

        let local = caps.name("local").map(|m| {
            m.as_str()
                .split(['-', '_', '.'])
                .map(|seg| match seg.parse::<u64>() {
                    Ok(n) => LocalSegment::Number(n),
                    Err(_) => LocalSegment::Text(seg.to_ascii_lowercase()),
                })
                .collect()
        });

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    /// The local label joined with `.`, if any
    pub fn local_label(&self) -> Option<String> {
        self.local.as_ref().map(|segments| {
            segments
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(".")
        })
    }

    /// The version without its local label
    pub fn public(&self) -> Self {
        Self {
            local: None,
            ..self.clone()
        }
    }

    /// Release segment with trailing zeros removed, used for ordering
    fn trimmed_release(&self) -> &[u64] {
        let mut end = self.release.len();
        while end > 0 && self.release[end - 1] == 0 {
            end -= 1;
        }
        &self.release[..end]
    }

    /// Release segment padded with zeros to at least `len` parts
    pub fn padded_release(&self, len: usize) -> Vec<u64> {
        let mut release = self.release.clone();
        while release.len() < len {
            release.push(0);
        }
        release
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }
}

impl fmt::Display for Pep440Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", release.join("."))?;
        if let Some((phase, n)) = self.pre {
            write!(f, "{}{}", phase.as_str(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        if let Some(local) = self.local_label() {
            write!(f, "+{}", local)?;
        }
        Ok(())
    }
}

impl PartialEq for Pep440Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

/// Position of the pre-release part in the total order
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    /// Dev release of a final version (`1.0.dev0` sorts before `1.0a0`)
    DevOnly,
    Pre(PrePhase, u64),
    Final,
}

impl Pep440Version {
    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (Some((phase, n)), _, _) => PreKey::Pre(phase, n),
            (None, _, _) => PreKey::Final,
        }
    }
}

impl Ord for Pep440Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.trimmed_release().cmp(other.trimmed_release()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            // absent post sorts first
            .then_with(|| self.post.cmp(&other.post))
            // absent dev sorts last
            .then_with(|| match (self.dev, other.dev) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(&b),
            })
            // absent local sorts first
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Pep440Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Pep440Version {
        Pep440Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_release() {
        let ver = v("1.2.3");
        assert_eq!(ver.epoch, 0);
        assert_eq!(ver.release, vec![1, 2, 3]);
        assert!(ver.pre.is_none() && ver.post.is_none() && ver.dev.is_none());
    }

    #[test]
    fn test_parse_normalizes_spellings() {
        assert_eq!(v("1.0alpha1").to_string(), "1.0a1");
        assert_eq!(v("1.0-beta.2").to_string(), "1.0b2");
        assert_eq!(v("1.0c3").to_string(), "1.0rc3");
        assert_eq!(v("1.0preview").to_string(), "1.0rc0");
        assert_eq!(v("1.0-r2").to_string(), "1.0.post2");
        assert_eq!(v("1.0-7").to_string(), "1.0.post7");
        assert_eq!(v("1.0.DEV").to_string(), "1.0.dev0");
        assert_eq!(v("v01.002").to_string(), "1.2");
        assert_eq!(v("1.0+Ubuntu-1").to_string(), "1.0+ubuntu.1");
        assert_eq!(v("2!1.0").to_string(), "2!1.0");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Pep440Version::parse("").is_err());
        assert!(Pep440Version::parse("abc").is_err());
        assert!(Pep440Version::parse("1.0+").is_err());
        assert!(Pep440Version::parse("1.0 extra").is_err());
    }

    #[test]
    fn test_ordering() {
        let ordered = [
            "1.0.dev0", "1.0a1", "1.0a2.dev1", "1.0a2", "1.0b1", "1.0rc1", "1.0", "1.0+local",
            "1.0.post1.dev0", "1.0.post1", "1.1", "1.10", "1!0.1",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_trailing_zeros_equal() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert!(v("3.9") < v("3.10"));
    }

    #[test]
    fn test_local_segment_ordering() {
        assert!(v("1.0+abc") < v("1.0+1"));
        assert!(v("1.0+1") < v("1.0+1.1"));
    }
}
