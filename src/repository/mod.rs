// src/repository/mod.rs

//! Package sources: local directories and remote OData feeds
//!
//! This module provides:
//! - The `PackageSource` trait shared by every kind of source
//! - `LocalDirectorySource` for folders of `.nupkg` archives
//! - `RemoteFeedSource` for NuGet v2 HTTP feeds
//! - `open_sources` to build the prioritized source list from configuration
//!
//! Queries never fail from the caller's point of view: transport and parse
//! problems are logged and the query returns fewer (or no) results.

pub mod local;
pub mod parsers;
pub mod query;
pub mod remote;

pub use local::LocalDirectorySource;
pub use remote::RemoteFeedSource;

use crate::manifest::ManifestEntry;
use crate::packages::{ArchiveReader, NupkgReader, PackageIdentifier, PackageRecord};
use crate::version::{VersionRange, compare_versions};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Default timeout for feed requests (30 seconds)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of packages sent in one `GetUpdates()` request
pub const UPDATE_BATCH_SIZE: usize = 10;

/// Default page size for searches
pub const DEFAULT_PAGE_SIZE: usize = 15;

/// Configuration of a single package source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSourceConfig {
    pub name: String,
    /// Directory path for local sources, base URL for remote feeds
    pub path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub enabled: bool,
}

impl PackageSourceConfig {
    /// Create an enabled source without credentials
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            username: None,
            password: None,
            enabled: true,
        }
    }

    /// Local sources are anything that is not an http(s) URL
    pub fn is_local(&self) -> bool {
        !self.path.trim_start().to_ascii_lowercase().starts_with("http")
    }
}

/// Parameters of a package search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub include_all_versions: bool,
    pub include_prerelease: bool,
    /// Page size
    pub take: usize,
    pub skip: usize,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            include_all_versions: false,
            include_prerelease: false,
            take: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }

    pub fn with_prerelease(mut self, include_prerelease: bool) -> Self {
        self.include_prerelease = include_prerelease;
        self
    }

    pub fn with_all_versions(mut self, include_all_versions: bool) -> Self {
        self.include_all_versions = include_all_versions;
        self
    }

    pub fn with_page(mut self, take: usize, skip: usize) -> Self {
        self.take = take;
        self.skip = skip;
        self
    }
}

/// Uniform query interface over local and remote package sources
pub trait PackageSource {
    /// Configured name of the source
    fn name(&self) -> &str;

    /// Find the exact package `id` at `version`
    fn find_by_id(&self, package: &PackageIdentifier) -> Option<PackageRecord>;

    /// Versions of `id` related to `range`, ascending
    fn find_by_range(
        &self,
        id: &str,
        range: &VersionRange,
        include_prerelease: bool,
    ) -> Vec<PackageRecord>;

    /// Search packages by term
    fn search(&self, query: &SearchQuery) -> Vec<PackageRecord>;

    /// Newer versions available for the installed packages
    fn compute_updates(
        &self,
        installed: &[ManifestEntry],
        include_prerelease: bool,
        include_all_versions: bool,
    ) -> Vec<PackageRecord>;
}

/// Settings shared by all sources opened from one configuration
#[derive(Clone)]
pub struct SourceOptions {
    pub timeout: Duration,
    pub reader: Arc<dyn ArchiveReader>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            timeout: HTTP_TIMEOUT,
            reader: Arc::new(NupkgReader::new()),
        }
    }
}

/// Open every enabled source, preserving configuration order
///
/// A remote source whose HTTP client cannot be created is logged and skipped.
pub fn open_sources(
    configs: &[PackageSourceConfig],
    options: &SourceOptions,
) -> Vec<Box<dyn PackageSource>> {
    let mut sources: Vec<Box<dyn PackageSource>> = Vec::new();

    for config in configs.iter().filter(|c| c.enabled) {
        if config.is_local() {
            debug!("Opening local source {} at {}", config.name, config.path);
            sources.push(Box::new(LocalDirectorySource::new(
                &config.name,
                &config.path,
                Arc::clone(&options.reader),
            )));
            continue;
        }

        match RemoteFeedSource::new(config, options.timeout) {
            Ok(source) => {
                debug!("Opening remote source {} at {}", config.name, config.path);
                sources.push(Box::new(source));
            }
            Err(e) => error!("Failed to open package source {}: {}", config.name, e),
        }
    }

    sources
}

/// Pick the update candidates for one installed package
///
/// Keeps candidates strictly newer than the installed version that satisfy
/// `allowed_versions` when set; only the newest one unless all versions are
/// requested. `candidates` must be sorted ascending.
pub(crate) fn select_updates(
    entry: &ManifestEntry,
    candidates: Vec<PackageRecord>,
    include_all_versions: bool,
) -> Vec<PackageRecord> {
    let allowed = entry.allowed_versions.as_deref().map(VersionRange::parse);

    let mut updates: Vec<PackageRecord> = candidates
        .into_iter()
        .filter(|c| c.id.eq_ignore_ascii_case(&entry.id))
        .filter(|c| compare_versions(&c.version, &entry.version) == Ordering::Greater)
        .filter(|c| allowed.as_ref().map(|r| r.satisfied_by(&c.version)).unwrap_or(true))
        .collect();

    if !include_all_versions && updates.len() > 1 {
        updates = updates.split_off(updates.len() - 1);
    }
    updates
}
