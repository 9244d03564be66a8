// src/packages/nupkg.rs

//! `.nupkg` archive reader
//!
//! A `.nupkg` is a zip archive with a `.nuspec` XML manifest at its root. Only
//! the manifest is read here; extracting the payload belongs to the
//! installation layer.

use crate::error::{Error, Result};
use crate::packages::identifier::{PackageIdentifier, PackageRecord, is_supported_framework};
use crate::packages::traits::ArchiveReader;
use crate::xml::{attribute, local_name};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// Reads package metadata from `.nupkg` archives
#[derive(Debug, Clone, Copy, Default)]
pub struct NupkgReader;

impl NupkgReader {
    pub fn new() -> Self {
        Self
    }

    /// Extract the raw `.nuspec` document from an archive
    fn read_nuspec(path: &Path) -> Result<String> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| {
            Error::Archive(format!("Failed to open {}: {}", path.display(), e))
        })?;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(|e| {
                Error::Archive(format!("Failed to read {}: {}", path.display(), e))
            })?;

            let name = entry.name().to_string();
            if name.contains('/') || !name.to_ascii_lowercase().ends_with(".nuspec") {
                continue;
            }

            let mut nuspec = String::new();
            entry.read_to_string(&mut nuspec)?;
            return Ok(nuspec);
        }

        Err(Error::Archive(format!(
            "No .nuspec manifest found in {}",
            path.display()
        )))
    }
}

impl ArchiveReader for NupkgReader {
    fn read(&self, path: &Path) -> Result<PackageRecord> {
        debug!("Reading package archive: {}", path.display());

        let nuspec = Self::read_nuspec(path)?;
        let mut record = parse_nuspec(&nuspec)?;
        record.download_url = Some(path.display().to_string());

        debug!(
            "Read {} version {} ({} dependencies)",
            record.id,
            record.version,
            record.dependencies.len()
        );
        Ok(record)
    }

    fn extension(&self) -> &str {
        "nupkg"
    }
}

/// Parse a `.nuspec` manifest into a package record
pub(crate) fn parse_nuspec(xml: &str) -> Result<PackageRecord> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut record = PackageRecord::default();
    let mut title = None;
    let mut in_metadata = false;
    let mut current_tag = String::new();
    // Target framework of the enclosing <group>, if any
    let mut group_framework: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = local_name(&e);
                match tag.as_str() {
                    "metadata" => in_metadata = true,
                    "group" => group_framework = Some(attribute(&e, "targetFramework").unwrap_or_default()),
                    "dependency" => push_dependency(&mut record, &e, group_framework.as_deref()),
                    _ => {}
                }
                current_tag = tag;
            }
            Ok(Event::Empty(e)) => {
                if local_name(&e) == "dependency" {
                    push_dependency(&mut record, &e, group_framework.as_deref());
                }
            }
            Ok(Event::Text(e)) if in_metadata => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::ParseError(format!("Invalid .nuspec text: {}", e)))?
                    .into_owned();
                match current_tag.as_str() {
                    "id" => record.id = text,
                    "version" => record.version = text,
                    "title" => title = Some(text),
                    "description" => record.description = Some(text),
                    "releaseNotes" => record.release_notes = Some(text),
                    "licenseUrl" => record.license_url = Some(text),
                    "iconUrl" => record.icon_url = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"metadata" => in_metadata = false,
                    b"group" => group_framework = None,
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::ParseError(format!("Failed to parse .nuspec: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    if record.id.is_empty() || record.version.is_empty() {
        return Err(Error::ParseError(
            ".nuspec is missing package id or version".to_string(),
        ));
    }

    record.title = title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| record.id.clone());
    Ok(record)
}

fn push_dependency(
    record: &mut PackageRecord,
    element: &quick_xml::events::BytesStart,
    group_framework: Option<&str>,
) {
    if !group_framework.map(is_supported_framework).unwrap_or(true) {
        return;
    }
    let id = attribute(element, "id").unwrap_or_default();
    if id.is_empty() {
        return;
    }
    // A dependency without a version accepts any version
    let version = attribute(element, "version").unwrap_or_else(|| "0.0".to_string());
    record.dependencies.push(PackageIdentifier::new(id, version));
}

/// Write a minimal `.nupkg` archive for tests
#[cfg(test)]
pub(crate) fn write_test_package(
    dir: &Path,
    id: &str,
    version: &str,
    dependencies: &[(&str, &str)],
) -> std::path::PathBuf {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let deps: String = dependencies
        .iter()
        .map(|(id, range)| format!(r#"<dependency id="{}" version="{}" />"#, id, range))
        .collect();
    let nuspec = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2011/08/nuspec.xsd">
  <metadata>
    <id>{id}</id>
    <version>{version}</version>
    <description>Test package {id}</description>
    <dependencies>{deps}</dependencies>
  </metadata>
</package>"#
    );

    let path = dir.join(format!("{}.{}.nupkg", id, version));
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.start_file(format!("{}.nuspec", id), SimpleFileOptions::default())
        .unwrap();
    zip.write_all(nuspec.as_bytes()).unwrap();
    zip.start_file("lib/net35/placeholder.txt", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"payload").unwrap();
    zip.finish().unwrap();
    path
}
