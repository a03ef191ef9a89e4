// src/version/mod.rs

//! Version handling for both sides of the conversion
//!
//! Upstream versions and specifiers follow PEP 440 ([`pep440`],
//! [`specifier`]); target versions and ranges follow rez ([`rez`],
//! [`range`]). Translation between the two lives in [`crate::translate`].

pub mod pep440;
pub mod range;
pub mod rez;
pub mod specifier;

pub use pep440::{Pep440Version, PrePhase};
pub use range::VersionRange;
pub use rez::RezVersion;
pub use specifier::{Operator, Specifier, SpecifierSet};
