// src/packages/identifier.rs

//! Package identity and metadata records

use crate::version::{is_prerelease, sort_order};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A package id paired with a version (or, for dependencies, a version range)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentifier {
    pub id: String,
    pub version: String,
}

impl PackageIdentifier {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    pub fn is_prerelease(&self) -> bool {
        is_prerelease(&self.version)
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.version)
    }
}

/// Order two packages by ordinal id, then by version
pub fn compare_identity(a_id: &str, a_version: &str, b_id: &str, b_version: &str) -> Ordering {
    a_id.cmp(b_id)
        .then_with(|| sort_order(a_version, b_version))
}

/// Whether a dependency declared for `target_framework` applies to us
///
/// Only framework-neutral dependencies and those for the legacy `net30`
/// moniker are followed.
pub fn is_supported_framework(target_framework: &str) -> bool {
    let target_framework = target_framework.trim();
    target_framework.is_empty() || target_framework.eq_ignore_ascii_case("net30")
}

/// Full package metadata as returned by a feed or read from a local archive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: String,
    pub version: String,
    pub title: String,
    pub description: Option<String>,
    pub release_notes: Option<String>,
    pub license_url: Option<String>,
    pub icon_url: Option<String>,
    pub download_url: Option<String>,
    /// Name of the package source that produced this record
    pub source: Option<String>,
    /// Dependencies; each `version` is a range string
    pub dependencies: Vec<PackageIdentifier>,
}

impl PackageRecord {
    /// Create a record with only identity set; title defaults to the id
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn identifier(&self) -> PackageIdentifier {
        PackageIdentifier::new(self.id.clone(), self.version.clone())
    }

    pub fn is_prerelease(&self) -> bool {
        is_prerelease(&self.version)
    }

    /// Ordering used for presentation: id ascending, then version ascending
    pub fn compare(&self, other: &Self) -> Ordering {
        compare_identity(&self.id, &self.version, &other.id, &other.version)
    }
}

/// Sort records by id then version
pub fn sort_records(records: &mut [PackageRecord]) {
    records.sort_by(PackageRecord::compare);
}

/// Keep only the highest version of each id (ids compared case-insensitively)
///
/// The result is ordered by id, then version.
pub fn latest_per_id(mut records: Vec<PackageRecord>) -> Vec<PackageRecord> {
    records.sort_by(|a, b| {
        a.id.to_ascii_lowercase()
            .cmp(&b.id.to_ascii_lowercase())
            .then_with(|| sort_order(&a.version, &b.version))
    });

    let mut latest: Vec<PackageRecord> = Vec::new();
    for record in records {
        match latest.last_mut() {
            Some(last) if last.id.eq_ignore_ascii_case(&record.id) => *last = record,
            _ => latest.push(record),
        }
    }
    sort_records(&mut latest);
    latest
}
