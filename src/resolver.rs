// src/resolver.rs

//! Update resolution across prioritized package sources

use crate::manifest::Manifest;
use crate::packages::{PackageIdentifier, PackageRecord, sort_records};
use crate::repository::{PackageSource, SearchQuery};
use crate::version::VersionRange;
use tracing::{debug, info};

/// Queries every source in priority order and merges the answers
pub struct UpdateResolver {
    sources: Vec<Box<dyn PackageSource>>,
}

impl UpdateResolver {
    pub fn new(sources: Vec<Box<dyn PackageSource>>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[Box<dyn PackageSource>] {
        &self.sources
    }

    /// Available updates for every installed package, sorted by id then version
    ///
    /// Results from all sources are concatenated; the same version offered by
    /// two sources appears twice.
    pub fn resolve(
        &self,
        manifest: &Manifest,
        include_prerelease: bool,
        include_all_versions: bool,
    ) -> Vec<PackageRecord> {
        let mut updates = Vec::new();

        for source in &self.sources {
            let found =
                source.compute_updates(manifest.entries(), include_prerelease, include_all_versions);
            debug!("Source {} offered {} updates", source.name(), found.len());
            updates.extend(found);
        }

        sort_records(&mut updates);
        info!(
            "Found {} updates for {} installed packages across {} sources",
            updates.len(),
            manifest.len(),
            self.sources.len()
        );
        updates
    }

    /// Locate a package: an exact match from the first source that has it,
    /// otherwise the nearest version at or above the requested one
    pub fn find_package(&self, package: &PackageIdentifier) -> Option<PackageRecord> {
        if let Some(found) = self.sources.iter().find_map(|s| s.find_by_id(package)) {
            debug!("Found {} in {:?}", package, found.source);
            return Some(found);
        }

        let range = VersionRange {
            is_min_inclusive: true,
            is_max_inclusive: false,
            minimum: Some(package.version.clone()),
            maximum: None,
        };
        let include_prerelease = package.is_prerelease();

        self.sources.iter().find_map(|source| {
            let candidate = source
                .find_by_range(&package.id, &range, include_prerelease)
                .into_iter()
                .next()?;
            info!(
                "{} not found, using nearest version {} from {}",
                package,
                candidate.version,
                source.name()
            );
            Some(candidate)
        })
    }

    /// Search all sources, concatenating results in source order
    pub fn search(&self, query: &SearchQuery) -> Vec<PackageRecord> {
        self.sources
            .iter()
            .flat_map(|source| source.search(query))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;
    use crate::version::compare_versions;
    use std::cmp::Ordering;

    /// In-memory source serving a fixed package list
    struct StaticSource {
        name: String,
        packages: Vec<PackageRecord>,
    }

    impl StaticSource {
        fn boxed(name: &str, packages: &[(&str, &str)]) -> Box<dyn PackageSource> {
            let packages = packages
                .iter()
                .map(|(id, version)| {
                    let mut record = PackageRecord::new(*id, *version);
                    record.source = Some(name.to_string());
                    record
                })
                .collect();
            Box::new(Self {
                name: name.to_string(),
                packages,
            })
        }

        fn versions_of(&self, id: &str) -> Vec<PackageRecord> {
            let mut records: Vec<PackageRecord> = self
                .packages
                .iter()
                .filter(|p| p.id.eq_ignore_ascii_case(id))
                .cloned()
                .collect();
            sort_records(&mut records);
            records
        }
    }

    impl PackageSource for StaticSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn find_by_id(&self, package: &PackageIdentifier) -> Option<PackageRecord> {
            self.versions_of(&package.id)
                .into_iter()
                .find(|p| compare_versions(&p.version, &package.version) == Ordering::Equal)
        }

        fn find_by_range(
            &self,
            id: &str,
            range: &VersionRange,
            include_prerelease: bool,
        ) -> Vec<PackageRecord> {
            self.versions_of(id)
                .into_iter()
                .filter(|p| include_prerelease || !p.is_prerelease())
                .filter(|p| range.satisfied_by(&p.version))
                .collect()
        }

        fn search(&self, query: &SearchQuery) -> Vec<PackageRecord> {
            self.packages
                .iter()
                .filter(|p| p.id.contains(&query.term))
                .cloned()
                .collect()
        }

        fn compute_updates(
            &self,
            installed: &[ManifestEntry],
            _include_prerelease: bool,
            include_all_versions: bool,
        ) -> Vec<PackageRecord> {
            installed
                .iter()
                .flat_map(|entry| {
                    crate::repository::select_updates(
                        entry,
                        self.versions_of(&entry.id),
                        include_all_versions,
                    )
                })
                .collect()
        }
    }

    fn labels(records: &[PackageRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| format!("{}@{}", r.identifier(), r.source.as_deref().unwrap_or("-")))
            .collect()
    }

    fn manifest(entries: &[(&str, &str)]) -> Manifest {
        let mut manifest = Manifest::new();
        for (id, version) in entries {
            manifest.add(ManifestEntry::new(*id, *version));
        }
        manifest
    }

    #[test]
    fn test_resolve_concatenates_and_sorts() {
        let resolver = UpdateResolver::new(vec![
            StaticSource::boxed("first", &[("Zed", "2.0"), ("Foo", "1.10")]),
            StaticSource::boxed("second", &[("Foo", "1.9"), ("Foo", "1.10")]),
        ]);
        let installed = manifest(&[("Foo", "1.0"), ("Zed", "1.0")]);

        let updates = resolver.resolve(&installed, false, false);
        assert_eq!(
            labels(&updates),
            vec!["Foo.1.10@first", "Foo.1.10@second", "Zed.2.0@first"]
        );
    }

    #[test]
    fn test_resolve_with_no_sources_or_packages() {
        let empty = UpdateResolver::new(Vec::new());
        assert!(empty.resolve(&manifest(&[("Foo", "1.0")]), true, true).is_empty());

        let resolver = UpdateResolver::new(vec![StaticSource::boxed("only", &[("Foo", "2.0")])]);
        assert!(resolver.resolve(&Manifest::new(), false, false).is_empty());
    }

    #[test]
    fn test_find_package_prefers_exact_match_in_priority_order() {
        let resolver = UpdateResolver::new(vec![
            StaticSource::boxed("first", &[("Foo", "1.0")]),
            StaticSource::boxed("second", &[("Foo", "1.2"), ("Foo", "1.5")]),
        ]);

        let exact = resolver.find_package(&PackageIdentifier::new("Foo", "1.5")).unwrap();
        assert_eq!(exact.source.as_deref(), Some("second"));

        let nearest = resolver.find_package(&PackageIdentifier::new("Foo", "1.1")).unwrap();
        assert_eq!(nearest.version, "1.2");

        assert!(resolver.find_package(&PackageIdentifier::new("Foo", "3.0")).is_none());
    }

    #[test]
    fn test_search_keeps_source_order() {
        let resolver = UpdateResolver::new(vec![
            StaticSource::boxed("first", &[("Json.Core", "1.0")]),
            StaticSource::boxed("second", &[("Json.Core", "2.0"), ("Xml", "1.0")]),
        ]);

        let found = resolver.search(&SearchQuery::new("Json"));
        assert_eq!(labels(&found), vec!["Json.Core.1.0@first", "Json.Core.2.0@second"]);
        assert_eq!(resolver.sources().len(), 2);
    }
}
