// src/version/range.rs

//! Version ranges
//!
//! A range is written with interval notation: `[1.0,2.0)` includes 1.0 and
//! excludes 2.0, `(1.0,)` is anything above 1.0, `[1.0]` is exactly 1.0, and a
//! bare `1.0` means "1.0 or newer".

use super::compare_versions;
use std::cmp::Ordering;
use std::fmt;

/// An interval of acceptable versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub is_min_inclusive: bool,
    pub is_max_inclusive: bool,
    pub minimum: Option<String>,
    pub maximum: Option<String>,
}

impl VersionRange {
    /// Parse a range string. Parsing never fails; bounds are validated lazily
    /// by the comparator when the range is used.
    pub fn parse(range: &str) -> Self {
        let range = range.trim();
        let is_min_inclusive = !range.starts_with('(');
        let is_max_inclusive = range.ends_with(']');

        let interior = range.strip_prefix(['[', '(']).unwrap_or(range);
        let interior = interior.strip_suffix([']', ')']).unwrap_or(interior);

        let (minimum, maximum) = match interior.split_once(',') {
            Some((min, max)) => (non_empty(min), non_empty(max)),
            None => (non_empty(interior), None),
        };

        Self {
            is_min_inclusive,
            is_max_inclusive,
            minimum,
            maximum,
        }
    }

    /// Range matching anything strictly newer than `version`
    pub fn newer_than(version: &str) -> Self {
        Self {
            is_min_inclusive: false,
            is_max_inclusive: false,
            minimum: non_empty(version),
            maximum: None,
        }
    }

    /// Where `version` falls relative to this range
    ///
    /// `Less` means below the range, `Equal` inside it, `Greater` above it.
    pub fn contains(&self, version: &str) -> Ordering {
        // `[x]` pins an exact version; the minimum's own inclusivity is ignored
        if self.maximum.is_none() && self.is_max_inclusive {
            if let Some(min) = &self.minimum {
                return compare_versions(min, version);
            }
        }

        if let Some(min) = &self.minimum {
            let cmp = compare_versions(version, min);
            let above_min = cmp == Ordering::Greater || (self.is_min_inclusive && cmp == Ordering::Equal);
            if !above_min {
                return Ordering::Less;
            }
        }

        if let Some(max) = &self.maximum {
            let cmp = compare_versions(version, max);
            let below_max = cmp == Ordering::Less || (self.is_max_inclusive && cmp == Ordering::Equal);
            if !below_max {
                return Ordering::Greater;
            }
        }

        Ordering::Equal
    }

    /// Convenience wrapper for `contains(version) == Equal`
    pub fn satisfied_by(&self, version: &str) -> bool {
        self.contains(version) == Ordering::Equal
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min = self.minimum.as_deref().unwrap_or("");
        let open = if self.is_min_inclusive { '[' } else { '(' };
        let close = if self.is_max_inclusive { ']' } else { ')' };
        match (&self.maximum, self.is_max_inclusive) {
            (Some(max), _) => write!(f, "{}{},{}{}", open, min, max, close),
            (None, true) => write!(f, "[{}]", min),
            (None, false) => write!(f, "{}{},{}", open, min, close),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}
