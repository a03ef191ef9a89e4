// src/version/rez.rs

//! Target (rez) versions
//!
//! A rez version is a sequence of tokens separated by `.` or `-`. Each token
//! is split into alternating alphabetic and numeric sub-tokens which compare
//! as follows:
//!
//! - alphabetic sub-tokens sort before numeric ones
//! - alphabetic sub-tokens compare character by character with `_` lowest,
//!   then `A-Z`, then `a-z`
//! - numeric sub-tokens compare by value, then by spelling (`01` < `1`)
//!
//! Versions compare token by token; a version that is a prefix of another
//! sorts first, so `1` < `1.0` < `1.0.0`.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone)]
enum SubToken {
    Alpha(String),
    Number(String),
}

fn alpha_key(c: char) -> u32 {
    if c == '_' { 0 } else { c as u32 }
}

fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        .then_with(|| a.cmp(b))
}

impl Ord for SubToken {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Alpha(a), Self::Alpha(b)) => a.chars().map(alpha_key).cmp(b.chars().map(alpha_key)),
            (Self::Number(a), Self::Number(b)) => cmp_numeric(a, b),
            (Self::Alpha(_), Self::Number(_)) => Ordering::Less,
            (Self::Number(_), Self::Alpha(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for SubToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SubToken {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SubToken {}

#[derive(Debug, Clone)]
struct Token {
    text: String,
    subtokens: Vec<SubToken>,
}

impl Token {
    fn parse(text: &str) -> Option<Self> {
        if text.is_empty() || !text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }

        let mut subtokens = Vec::new();
        let mut current = String::new();
        let mut current_numeric = false;
        for c in text.chars() {
            let numeric = c.is_ascii_digit();
            if !current.is_empty() && numeric != current_numeric {
                subtokens.push(Self::subtoken(std::mem::take(&mut current), current_numeric));
            }
            current_numeric = numeric;
            current.push(c);
        }
        subtokens.push(Self::subtoken(current, current_numeric));

        Some(Self {
            text: text.to_string(),
            subtokens,
        })
    }

    fn subtoken(s: String, numeric: bool) -> SubToken {
        if numeric { SubToken::Number(s) } else { SubToken::Alpha(s) }
    }

    /// Smallest token that sorts after this one and all of its extensions
    fn next(&self) -> Self {
        let mut next = self.clone();
        next.text.push('_');
        match next.subtokens.last_mut() {
            Some(SubToken::Alpha(s)) => s.push('_'),
            _ => next.subtokens.push(SubToken::Alpha("_".to_string())),
        }
        next
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        self.subtokens.cmp(&other.subtokens)
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Token {}

/// A target package version
#[derive(Debug, Clone, Default)]
pub struct RezVersion {
    tokens: Vec<Token>,
    /// Separator preceding each token after the first
    separators: Vec<char>,
}

impl RezVersion {
    /// Parse a version string; the empty string is the empty version
    pub fn parse(s: &str) -> Result<Self> {
        let mut version = Self::default();
        if s.is_empty() {
            return Ok(version);
        }

        let mut start = 0;
        for (i, c) in s.char_indices() {
            if c == '.' || c == '-' {
                version.push_token(&s[start..i], s)?;
                version.separators.push(c);
                start = i + 1;
            }
        }
        version.push_token(&s[start..], s)?;
        Ok(version)
    }

    fn push_token(&mut self, text: &str, input: &str) -> Result<()> {
        let token = Token::parse(text)
            .ok_or_else(|| Error::ParseError(format!("Invalid version token '{}' in '{}'", text, input)))?;
        self.tokens.push(token);
        Ok(())
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Keep only the first `len` tokens
    pub fn trim(&self, len: usize) -> Self {
        let len = len.min(self.tokens.len());
        Self {
            tokens: self.tokens[..len].to_vec(),
            separators: self.separators[..len.saturating_sub(1)].to_vec(),
        }
    }

    /// The smallest version greater than this one and every version that
    /// extends it (`1.2` → `1.2_`, so `1.2.9` < `1.2_` < `1.3`)
    pub fn next(&self) -> Self {
        let mut next = self.clone();
        match next.tokens.pop() {
            Some(last) => next.tokens.push(last.next()),
            None => {
                if let Some(token) = Token::parse("_") {
                    next.tokens.push(token);
                }
            }
        }
        next
    }

    /// Whether `other` equals this version or extends it by more tokens
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.tokens.len() <= other.tokens.len()
            && self.tokens.iter().zip(&other.tokens).all(|(a, b)| a == b)
    }
}

impl fmt::Display for RezVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", self.separators[i - 1])?;
            }
            write!(f, "{}", token.text)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for RezVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Ord for RezVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tokens.cmp(&other.tokens)
    }
}

impl PartialOrd for RezVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RezVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RezVersion {}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> RezVersion {
        RezVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(v("1.2.3").to_string(), "1.2.3");
        assert_eq!(v("1.0-abc.7").to_string(), "1.0-abc.7");
        assert_eq!(v("1.0.a1").len(), 3);
        assert!(v("").is_empty());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RezVersion::parse("1..2").is_err());
        assert!(RezVersion::parse("1.2+").is_err());
        assert!(RezVersion::parse(".1").is_err());
    }

    #[test]
    fn test_ordering() {
        let ordered = ["", "1", "1.0", "1.0.0", "1.a1", "1.0.a1", "1.1", "1.2_", "1.10", "2"];
        let mut sorted: Vec<RezVersion> = ordered.iter().map(|s| v(s)).collect();
        sorted.sort();
        let rendered: Vec<String> = sorted.iter().map(|v| v.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["", "1", "1.a1", "1.0", "1.0.a1", "1.0.0", "1.1", "1.2_", "1.10", "2"]
        );
    }

    #[test]
    fn test_alpha_ordering() {
        assert!(v("1._") < v("1.A"));
        assert!(v("1.Z") < v("1.a"));
        assert!(v("1.a") < v("1.0"));
        assert!(v("01") < v("1"));
        assert!(v("1.post1") < v("1.1"));
    }

    #[test]
    fn test_next() {
        assert_eq!(v("1.2").next().to_string(), "1.2_");
        assert_eq!(v("1.a").next().to_string(), "1.a_");
        assert!(v("1.2.9") < v("1.2").next());
        assert!(v("1.2").next() < v("1.3"));
        assert!(v("1").next() < v("2"));
    }

    #[test]
    fn test_trim_and_prefix() {
        assert_eq!(v("1.2.3").trim(2).to_string(), "1.2");
        assert_eq!(v("1.2").trim(5).to_string(), "1.2");
        assert!(v("1.2").is_prefix_of(&v("1.2.3")));
        assert!(!v("1.3").is_prefix_of(&v("1.2.3")));
    }
}
