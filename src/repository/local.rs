// src/repository/local.rs

//! Local directory package source
//!
//! A local feed is a flat directory holding one archive per package version,
//! named `{id}.{version}.nupkg`.

use super::{PackageSource, SearchQuery, select_updates};
use crate::manifest::ManifestEntry;
use crate::packages::{ArchiveReader, PackageIdentifier, PackageRecord, latest_per_id, sort_records};
use crate::version::VersionRange;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Package source backed by a directory of package archives
pub struct LocalDirectorySource {
    name: String,
    path: PathBuf,
    reader: Arc<dyn ArchiveReader>,
}

impl LocalDirectorySource {
    pub fn new(name: &str, path: impl AsRef<Path>, reader: Arc<dyn ArchiveReader>) -> Self {
        Self {
            name: name.to_string(),
            path: path.as_ref().to_path_buf(),
            reader,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open every archive whose lowercased file name passes `accept`
    fn read_archives(&self, accept: impl Fn(&str) -> bool) -> Vec<PackageRecord> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list local source {} ({}): {}", self.name, self.path.display(), e);
                return Vec::new();
            }
        };

        let suffix = format!(".{}", self.reader.extension().to_ascii_lowercase());
        let mut records = Vec::new();

        for entry in entries.filter_map(|e| e.ok()) {
            let file_name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            if !file_name.ends_with(&suffix) || !accept(&file_name) {
                continue;
            }

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            match self.reader.read(&path) {
                Ok(mut record) => {
                    record.source = Some(self.name.clone());
                    records.push(record);
                }
                Err(e) => warn!("Skipping unreadable package {}: {}", path.display(), e),
            }
        }

        debug!("Read {} archives from {}", records.len(), self.path.display());
        records
    }

    /// All local versions of `id`, ascending
    fn versions_of(&self, id: &str, include_prerelease: bool, include_all_versions: bool) -> Vec<PackageRecord> {
        let prefix = format!("{}.", id.to_ascii_lowercase());
        let mut records: Vec<PackageRecord> = self
            .read_archives(|file_name| file_name.starts_with(&prefix))
            .into_iter()
            .filter(|r| r.id.eq_ignore_ascii_case(id))
            .filter(|r| include_prerelease || !r.is_prerelease())
            .collect();

        if include_all_versions {
            sort_records(&mut records);
            records
        } else {
            latest_per_id(records)
        }
    }
}

impl PackageSource for LocalDirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_by_id(&self, package: &PackageIdentifier) -> Option<PackageRecord> {
        let file_name = format!("{}.{}.{}", package.id, package.version, self.reader.extension());
        let path = self.path.join(file_name);
        if !path.is_file() {
            debug!("{} not found in {}", package, self.path.display());
            return None;
        }

        match self.reader.read(&path) {
            Ok(mut record) => {
                record.source = Some(self.name.clone());
                Some(record)
            }
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn find_by_range(
        &self,
        id: &str,
        range: &VersionRange,
        include_prerelease: bool,
    ) -> Vec<PackageRecord> {
        self.versions_of(id, include_prerelease, true)
            .into_iter()
            .skip_while(|r| !range.satisfied_by(&r.version))
            .collect()
    }

    fn search(&self, query: &SearchQuery) -> Vec<PackageRecord> {
        let term = query.term.trim().to_ascii_lowercase();
        let mut records: Vec<PackageRecord> = self
            .read_archives(|file_name| file_name.contains(&term))
            .into_iter()
            .filter(|r| r.id.to_ascii_lowercase().contains(&term))
            .filter(|r| query.include_prerelease || !r.is_prerelease())
            .collect();

        if query.include_all_versions {
            sort_records(&mut records);
        } else {
            records = latest_per_id(records);
        }

        records
            .into_iter()
            .skip(query.skip)
            .take(query.take)
            .collect()
    }

    fn compute_updates(
        &self,
        installed: &[ManifestEntry],
        include_prerelease: bool,
        include_all_versions: bool,
    ) -> Vec<PackageRecord> {
        let mut updates = Vec::new();
        for entry in installed {
            let candidates = self.versions_of(&entry.id, include_prerelease, true);
            updates.extend(select_updates(entry, candidates, include_all_versions));
        }
        debug!("Local source {} has {} updates", self.name, updates.len());
        updates
    }
}
