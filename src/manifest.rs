// src/manifest.rs

//! Installed-package manifest (`packages.config`)
//!
//! The manifest records which packages a project depends on:
//!
//! ```xml
//! <packages>
//!   <package id="Newtonsoft.Json" version="13.0.1" targetFramework="net35" />
//! </packages>
//! ```
//!
//! Ids are unique case-insensitively. When the same id is added twice the
//! higher version wins.

use crate::error::{Error, Result};
use crate::version::{compare_versions, sort_order};
use crate::xml::{attribute, parse_bool};
use quick_xml::Writer;
use quick_xml::Reader;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// One installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub version: String,
    pub target_framework: Option<String>,
    /// Version range updates must stay within
    pub allowed_versions: Option<String>,
    pub development_dependency: bool,
}

impl ManifestEntry {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            target_framework: None,
            allowed_versions: None,
            development_dependency: false,
        }
    }

    fn from_element(element: &BytesStart) -> Result<Self> {
        let id = attribute(element, "id")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::ParseError("package element without id".to_string()))?;
        let version = attribute(element, "version")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::ParseError(format!("package {} has no version", id)))?;

        Ok(Self {
            id,
            version,
            target_framework: attribute(element, "targetFramework"),
            allowed_versions: attribute(element, "allowedVersions"),
            development_dependency: attribute(element, "developmentDependency")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(false),
        })
    }

    fn to_element(&self) -> BytesStart<'_> {
        let mut element = BytesStart::new("package");
        element.push_attribute(("id", self.id.as_str()));
        element.push_attribute(("version", self.version.as_str()));
        if let Some(framework) = &self.target_framework {
            element.push_attribute(("targetFramework", framework.as_str()));
        }
        if let Some(allowed) = &self.allowed_versions {
            element.push_attribute(("allowedVersions", allowed.as_str()));
        }
        if self.development_dependency {
            element.push_attribute(("developmentDependency", "true"));
        }
        element
    }
}

/// The set of installed packages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a manifest, creating and saving an empty one if the file is absent
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("Creating empty manifest at {}", path.display());
            let manifest = Self::new();
            manifest.save(path)?;
            return Ok(manifest);
        }

        let content = fs::read_to_string(path)?;
        let manifest = Self::parse(&content)?;
        debug!("Loaded {} packages from {}", manifest.entries.len(), path.display());
        Ok(manifest)
    }

    /// Parse manifest XML; `package` elements lacking id or version are skipped
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut manifest = Self::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e) | Event::Empty(e)) if e.local_name().as_ref() == b"package" => {
                    match ManifestEntry::from_element(&e) {
                        Ok(entry) => manifest.add(entry),
                        Err(err) => warn!("Skipping manifest entry: {}", err),
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::ParseError(format!("Failed to parse manifest: {}", e)));
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(manifest)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by case-insensitive id
    pub fn find(&self, id: &str) -> Option<&ManifestEntry> {
        let id = id.trim();
        self.entries.iter().find(|e| e.id.eq_ignore_ascii_case(id))
    }

    /// Add an entry, resolving an existing entry for the same id by version
    pub fn add(&mut self, entry: ManifestEntry) {
        let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.id.eq_ignore_ascii_case(&entry.id))
        else {
            self.entries.push(entry);
            return;
        };

        match compare_versions(&entry.version, &existing.version) {
            Ordering::Greater => {
                warn!(
                    "{} {} replaces already listed version {}",
                    entry.id, entry.version, existing.version
                );
                *existing = entry;
            }
            Ordering::Less => {
                warn!(
                    "Ignoring {} {}: version {} is already listed",
                    entry.id, entry.version, existing.version
                );
            }
            Ordering::Equal => {}
        }
    }

    /// Remove the entry with the given id; returns whether one was removed
    pub fn remove(&mut self, id: &str) -> bool {
        let id = id.trim();
        let before = self.entries.len();
        self.entries.retain(|e| !e.id.trim().eq_ignore_ascii_case(id));
        self.entries.len() != before
    }

    /// Serialize entries sorted by id, then version
    pub fn to_xml(&self) -> Result<String> {
        let mut entries: Vec<&ManifestEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| {
            a.id.cmp(&b.id)
                .then_with(|| sort_order(&a.version, &b.version))
        });

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("packages")))?;
        for entry in entries {
            writer.write_event(Event::Empty(entry.to_element()))?;
        }
        writer.write_event(Event::End(BytesEnd::new("packages")))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::ParseError(format!("Manifest is not valid UTF-8: {}", e)))
    }

    /// Write the manifest, clearing a read-only flag on the target first
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let xml = self.to_xml()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        if let Ok(metadata) = fs::metadata(path) {
            let mut permissions = metadata.permissions();
            if permissions.readonly() {
                debug!("Clearing read-only flag on {}", path.display());
                #[allow(clippy::permissions_set_readonly_false)]
                permissions.set_readonly(false);
                fs::set_permissions(path, permissions)?;
            }
        }

        fs::write(path, xml)?;
        debug!("Saved {} packages to {}", self.entries.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(manifest: &Manifest) -> Vec<(String, String)> {
        manifest
            .entries()
            .iter()
            .map(|e| (e.id.clone(), e.version.clone()))
            .collect()
    }

    #[test]
    fn test_load_creates_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/packages.config");

        let manifest = Manifest::load(&path).unwrap();
        assert!(manifest.is_empty());
        assert!(path.exists());
        assert!(Manifest::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_parse_reads_all_attributes() {
        let manifest = Manifest::parse(
            r#"<?xml version="1.0" encoding="utf-8"?>
<packages>
  <package id="A" version="1.0" targetFramework="net35" allowedVersions="[1,2)" developmentDependency="true" />
  <package id="B" version="2.0"></package>
  <package version="3.0" />
  <package id="NoVersion" />
</packages>"#,
        )
        .unwrap();

        assert_eq!(manifest.len(), 2);
        let a = manifest.find("a").unwrap();
        assert_eq!(a.target_framework.as_deref(), Some("net35"));
        assert_eq!(a.allowed_versions.as_deref(), Some("[1,2)"));
        assert!(a.development_dependency);
        assert!(!manifest.find("B").unwrap().development_dependency);
    }

    #[test]
    fn test_add_conflict_rules() {
        let mut manifest = Manifest::new();
        manifest.add(ManifestEntry::new("Foo", "1.5"));

        manifest.add(ManifestEntry::new("foo", "1.2"));
        assert_eq!(pairs(&manifest), vec![("Foo".to_string(), "1.5".to_string())]);

        manifest.add(ManifestEntry::new("Foo", "1.5.0"));
        assert_eq!(pairs(&manifest), vec![("Foo".to_string(), "1.5".to_string())]);

        manifest.add(ManifestEntry::new("FOO", "1.10"));
        assert_eq!(pairs(&manifest), vec![("FOO".to_string(), "1.10".to_string())]);
    }

    #[test]
    fn test_remove_is_case_insensitive_and_trimmed() {
        let mut manifest = Manifest::new();
        manifest.add(ManifestEntry::new("Foo.Bar", "1.0"));
        manifest.add(ManifestEntry::new("Baz", "1.0"));

        assert!(manifest.remove("  foo.bar "));
        assert!(!manifest.remove("foo.bar"));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_save_sorts_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packages.config");

        let mut manifest = Manifest::new();
        manifest.add(ManifestEntry::new("Zeta", "1.0"));
        manifest.add(ManifestEntry::new("Alpha", "10.0"));
        let mut pinned = ManifestEntry::new("Beta", "2.0");
        pinned.allowed_versions = Some("[2.0,3.0)".to_string());
        manifest.add(pinned);
        manifest.save(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let alpha = written.find("Alpha").unwrap();
        let beta = written.find("Beta").unwrap();
        let zeta = written.find("Zeta").unwrap();
        assert!(alpha < beta && beta < zeta);
        assert!(!written.contains("targetFramework"));

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(
            pairs(&loaded),
            vec![
                ("Alpha".to_string(), "10.0".to_string()),
                ("Beta".to_string(), "2.0".to_string()),
                ("Zeta".to_string(), "1.0".to_string()),
            ]
        );
        assert_eq!(loaded.find("beta").unwrap().allowed_versions.as_deref(), Some("[2.0,3.0)"));
    }

    #[test]
    fn test_save_overwrites_read_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packages.config");
        Manifest::new().save(&path).unwrap();

        let mut permissions = fs::metadata(&path).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&path, permissions).unwrap();

        let mut manifest = Manifest::new();
        manifest.add(ManifestEntry::new("Foo", "1.0"));
        manifest.save(&path).unwrap();

        assert_eq!(Manifest::load(&path).unwrap().len(), 1);
        assert!(!fs::metadata(&path).unwrap().permissions().readonly());
    }

    #[test]
    fn test_save_with_malformed_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packages.config");

        let mut manifest = Manifest::new();
        for i in 0..40 {
            let version = if i % 3 == 0 { format!("v{}", i) } else { format!("1.{}", i) };
            manifest.add(ManifestEntry::new(format!("Package{:02}", i % 7), version));
        }
        manifest.add(ManifestEntry::new("Alpha", "1.0.0+meta"));
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded.len(), manifest.len());
        assert_eq!(loaded.entries()[0].id, "Alpha");
        assert_eq!(loaded.find("alpha").unwrap().version, "1.0.0+meta");
    }

    #[test]
    fn test_parse_rejects_broken_xml() {
        assert!(Manifest::parse("<packages><package id=\"A\" version=\"1\"></packages>").is_err());
    }
}
