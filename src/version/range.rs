// src/version/range.rs

//! Target version ranges
//!
//! A range is a sorted list of disjoint intervals. Each interval is bounded
//! by two cuts in the version line; a cut sits either just below or just
//! above a version, which expresses inclusive and exclusive bounds with a
//! single ordering.
//!
//! Rendering follows the rez range syntax:
//!
//! | interval            | text     |
//! |---------------------|----------|
//! | `[1, 1.next())`     | `1`      |
//! | `[1, +inf)`         | `1+`     |
//! | `(1, +inf)`         | `>1`     |
//! | `(-inf, 2)`         | `<2`     |
//! | `(-inf, 2]`         | `<=2`    |
//! | `[1, 2)`            | `1+<2`   |
//! | `[1, 2]`            | `1..2`   |
//! | `[1, 1]`            | `==1`    |
//!
//! Intervals are joined with `|`; the unbounded range renders as "".

use super::rez::RezVersion;
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A position on the version line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Cut {
    NegInf,
    Below(RezVersion),
    Above(RezVersion),
    PosInf,
}

impl Cut {
    fn rank(&self) -> u8 {
        match self {
            Self::NegInf => 0,
            Self::Below(_) | Self::Above(_) => 1,
            Self::PosInf => 2,
        }
    }
}

impl Ord for Cut {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Below(a), Self::Below(b)) | (Self::Above(a), Self::Above(b)) => a.cmp(b),
            (Self::Below(a), Self::Above(b)) => a.cmp(b).then(Ordering::Less),
            (Self::Above(a), Self::Below(b)) => a.cmp(b).then(Ordering::Greater),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Cut {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Interval {
    lower: Cut,
    upper: Cut,
}

impl Interval {
    fn is_empty(&self) -> bool {
        self.lower >= self.upper
    }

    fn intersect(&self, other: &Interval) -> Interval {
        Interval {
            lower: self.lower.clone().max(other.lower.clone()),
            upper: self.upper.clone().min(other.upper.clone()),
        }
    }

    fn contains(&self, version: &RezVersion) -> bool {
        let below = Cut::Below(version.clone());
        let above = Cut::Above(version.clone());
        self.lower <= below && above <= self.upper
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.lower, &self.upper) {
            (Cut::NegInf, Cut::PosInf) => Ok(()),
            (Cut::Below(lo), Cut::PosInf) => write!(f, "{}+", lo),
            (Cut::Above(lo), Cut::PosInf) => write!(f, ">{}", lo),
            (Cut::NegInf, Cut::Below(hi)) => write!(f, "<{}", hi),
            (Cut::NegInf, Cut::Above(hi)) => write!(f, "<={}", hi),
            (Cut::Below(lo), Cut::Above(hi)) if lo == hi => write!(f, "=={}", lo),
            (Cut::Below(lo), Cut::Below(hi)) if *hi == lo.next() => write!(f, "{}", lo),
            (Cut::Below(lo), Cut::Above(hi)) => write!(f, "{}..{}", lo, hi),
            (lower, upper) => {
                match lower {
                    Cut::Below(lo) => write!(f, "{}+", lo)?,
                    Cut::Above(lo) => write!(f, ">{}", lo)?,
                    _ => {}
                }
                match upper {
                    Cut::Below(hi) => write!(f, "<{}", hi),
                    Cut::Above(hi) => write!(f, "<={}", hi),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// A set of target versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    intervals: Vec<Interval>,
}

impl VersionRange {
    fn from_intervals(intervals: Vec<Interval>) -> Self {
        let mut intervals: Vec<Interval> = intervals.into_iter().filter(|i| !i.is_empty()).collect();
        intervals.sort_by(|a, b| a.lower.cmp(&b.lower));

        let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if interval.lower <= last.upper => {
                    if interval.upper > last.upper {
                        last.upper = interval.upper;
                    }
                }
                _ => merged.push(interval),
            }
        }
        Self { intervals: merged }
    }

    fn single(lower: Cut, upper: Cut) -> Self {
        Self::from_intervals(vec![Interval { lower, upper }])
    }

    /// Every version
    pub fn any() -> Self {
        Self::single(Cut::NegInf, Cut::PosInf)
    }

    /// `v` and every version extending it (`1` matches `1`, `1.0`, `1.9.2`)
    pub fn family(v: RezVersion) -> Self {
        let next = v.next();
        Self::single(Cut::Below(v), Cut::Below(next))
    }

    /// Exactly `v`
    pub fn exact(v: RezVersion) -> Self {
        Self::single(Cut::Below(v.clone()), Cut::Above(v))
    }

    /// `v+`
    pub fn at_least(v: RezVersion) -> Self {
        Self::single(Cut::Below(v), Cut::PosInf)
    }

    /// `>v`
    pub fn above(v: RezVersion) -> Self {
        Self::single(Cut::Above(v), Cut::PosInf)
    }

    /// `<v`
    pub fn below(v: RezVersion) -> Self {
        Self::single(Cut::NegInf, Cut::Below(v))
    }

    /// `<=v`
    pub fn at_most(v: RezVersion) -> Self {
        Self::single(Cut::NegInf, Cut::Above(v))
    }

    /// `lo+<hi`; empty when `hi <= lo`
    pub fn between(lo: RezVersion, hi: RezVersion) -> Self {
        Self::single(Cut::Below(lo), Cut::Below(hi))
    }

    /// Whether no version is contained
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Whether every version is contained
    pub fn is_any(&self) -> bool {
        matches!(
            self.intervals.as_slice(),
            [Interval { lower: Cut::NegInf, upper: Cut::PosInf }]
        )
    }

    pub fn contains(&self, version: &RezVersion) -> bool {
        self.intervals.iter().any(|i| i.contains(version))
    }

    /// Versions contained in either range
    pub fn union(&self, other: &VersionRange) -> VersionRange {
        let mut intervals = self.intervals.clone();
        intervals.extend(other.intervals.iter().cloned());
        Self::from_intervals(intervals)
    }

    /// Versions contained in both ranges (possibly empty)
    pub fn intersection(&self, other: &VersionRange) -> VersionRange {
        let mut intervals = Vec::new();
        for a in &self.intervals {
            for b in &other.intervals {
                intervals.push(a.intersect(b));
            }
        }
        Self::from_intervals(intervals)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, interval) in self.intervals.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}", interval)?;
        }
        Ok(())
    }
}

fn parse_bound(text: &str, input: &str) -> Result<VersionRange> {
    let version = |s: &str| -> Result<RezVersion> {
        if s.is_empty() {
            return Err(Error::ParseError(format!("Missing version in range '{}'", input)));
        }
        RezVersion::parse(s)
    };

    if text.is_empty() {
        return Ok(VersionRange::any());
    }
    if let Some(rest) = text.strip_prefix("==") {
        return Ok(VersionRange::exact(version(rest)?));
    }
    if let Some((lo, hi)) = text.split_once("..") {
        let (lo, hi) = (version(lo)?, version(hi)?);
        return Ok(VersionRange::single(Cut::Below(lo), Cut::Above(hi)));
    }

    // optional lower bound followed by optional upper bound
    let upper_at = text.find('<').unwrap_or(text.len());
    let (lower_text, upper_text) = text.split_at(upper_at);

    let lower = if lower_text.is_empty() {
        Cut::NegInf
    } else if let Some(rest) = lower_text.strip_prefix(">=") {
        Cut::Below(version(rest)?)
    } else if let Some(rest) = lower_text.strip_prefix('>') {
        Cut::Above(version(rest)?)
    } else if let Some(rest) = lower_text.strip_suffix('+') {
        Cut::Below(version(rest)?)
    } else if upper_text.is_empty() {
        return Ok(VersionRange::family(version(lower_text)?));
    } else {
        return Err(Error::ParseError(format!("Invalid range '{}'", input)));
    };

    let upper = if upper_text.is_empty() {
        Cut::PosInf
    } else if let Some(rest) = upper_text.strip_prefix("<=") {
        Cut::Above(version(rest)?)
    } else if let Some(rest) = upper_text.strip_prefix('<') {
        Cut::Below(version(rest)?)
    } else {
        return Err(Error::ParseError(format!("Invalid range '{}'", input)));
    };

    Ok(VersionRange::single(lower, upper))
}

impl FromStr for VersionRange {
    type Err = Error;

    /// Parse the rez range syntax produced by [`VersionRange`]'s `Display`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut range: Option<VersionRange> = None;
        for part in s.split('|') {
            let bound = parse_bound(part.trim(), s)?;
            range = Some(match range {
                Some(r) => r.union(&bound),
                None => bound,
            });
        }
        range.ok_or_else(|| Error::ParseError(format!("Invalid range '{}'", s)))
    }
}
