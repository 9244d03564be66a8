// src/version/mod.rs

//! Version parsing and comparison
//!
//! Package versions are dotted numeric strings with two to four fields
//! (`major.minor[.patch[.build]]`) and an optional prerelease tag after the
//! first `-`. Comparison is tolerant: a malformed version is reported through
//! `tracing` and sorts lowest instead of failing the caller's sort or filter.

pub mod range;

pub use range::VersionRange;

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::str::FromStr;
use tracing::warn;

/// A parsed package version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub major: i64,
    pub minor: i64,
    pub patch: i64,
    pub build: i64,
    /// Everything after the first `-`, verbatim (may contain further `-`)
    pub prerelease: Option<String>,
}

impl PackageVersion {
    /// Parse a version string
    pub fn parse(version: &str) -> Result<Self> {
        let version = version.trim();
        let (core, prerelease) = match version.split_once('-') {
            Some((core, tag)) => (core, Some(tag.to_string())),
            None => (version, None),
        };

        let mut fields = core.split('.');
        let major = parse_field(fields.next(), version, "major")?;
        let minor = parse_field(fields.next(), version, "minor")?;
        let patch = fields
            .next()
            .map(|f| parse_field(Some(f), version, "patch"))
            .transpose()?
            .unwrap_or(0);
        let build = fields
            .next()
            .map(|f| parse_field(Some(f), version, "build"))
            .transpose()?
            .unwrap_or(0);

        Ok(Self {
            major,
            minor,
            patch,
            build,
            prerelease,
        })
    }

    /// True when the version carries a prerelease tag
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then(self.build.cmp(&other.build))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.as_str().cmp(b.as_str()),
            })
    }
}

impl FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_field(field: Option<&str>, version: &str, name: &str) -> Result<i64> {
    let field = field.ok_or_else(|| {
        Error::MalformedVersion(format!("'{}' is missing the {} field", version, name))
    })?;
    field.trim().parse::<i64>().map_err(|e| {
        Error::MalformedVersion(format!("'{}' has invalid {} field: {}", version, name, e))
    })
}

/// Compare two version strings
///
/// If either side fails to parse the result is `Ordering::Less` and a warning
/// is logged. That is not a total order; sort with `sort_order`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (PackageVersion::parse(a), PackageVersion::parse(b)) {
        (Ok(a), Ok(b)) => a.compare(&b),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Comparing '{}' with '{}': {}", a, b, e);
            Ordering::Less
        }
    }
}

/// Total ordering of version strings for sorting
///
/// Agrees with `compare_versions` when both sides parse. Malformed versions
/// sort below every valid one and compare ordinally among themselves.
pub fn sort_order(a: &str, b: &str) -> Ordering {
    match (PackageVersion::parse(a), PackageVersion::parse(b)) {
        (Ok(a), Ok(b)) => a.compare(&b),
        (Err(_), Ok(_)) => Ordering::Less,
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// True iff the version string contains a prerelease separator
pub fn is_prerelease(version: &str) -> bool {
    version.contains('-')
}
