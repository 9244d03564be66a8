// src/repository/parsers/atom.rs

//! OData/Atom feed response parser
//!
//! NuGet v2 feeds answer every query with an Atom document. Each `<entry>`
//! carries the package id in its Atom `<title>`, the download location in
//! `<content src="...">` and the rest of the metadata inside
//! `<m:properties>` as `d:`-prefixed elements.

use crate::error::{Error, Result};
use crate::packages::{PackageIdentifier, PackageRecord, is_supported_framework};
use crate::xml::{attribute, local_name};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, warn};

/// Lazily decodes the entries of a feed document, one record per `next()`
///
/// Malformed entries are skipped. An XML syntax error ends the iteration;
/// records produced before it are kept by the caller.
pub struct FeedEntries<'a> {
    reader: Reader<&'a [u8]>,
    buf: Vec<u8>,
    finished: bool,
}

impl<'a> FeedEntries<'a> {
    pub fn new(document: &'a str) -> Self {
        let mut reader = Reader::from_str(document);
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            finished: false,
        }
    }
}

impl Iterator for FeedEntries<'_> {
    type Item = PackageRecord;

    fn next(&mut self) -> Option<PackageRecord> {
        if self.finished {
            return None;
        }

        let mut entry: Option<EntryBuilder> = None;
        let mut in_properties = false;
        let mut current_tag = String::new();

        loop {
            let mut completed = None;

            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => {
                    let tag = local_name(&e);
                    match tag.as_str() {
                        "entry" => entry = Some(EntryBuilder::default()),
                        "properties" => in_properties = true,
                        "content" => {
                            if let Some(builder) = entry.as_mut() {
                                builder.download_url = attribute(&e, "src");
                            }
                        }
                        _ => {}
                    }
                    current_tag = tag;
                }
                Ok(Event::Empty(e)) => {
                    if let Some(builder) = entry.as_mut() {
                        if local_name(&e) == "content" {
                            builder.download_url = attribute(&e, "src");
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(builder) = entry.as_mut() {
                        match e.unescape() {
                            Ok(text) => builder.set(&current_tag, in_properties, text.into_owned()),
                            Err(err) => warn!("Skipping undecodable text in <{}>: {}", current_tag, err),
                        }
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(builder) = entry.as_mut() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        builder.set(&current_tag, in_properties, text);
                    }
                }
                Ok(Event::End(e)) => {
                    match e.local_name().as_ref() {
                        b"entry" => completed = entry.take(),
                        b"properties" => in_properties = false,
                        _ => {}
                    }
                    current_tag.clear();
                }
                Ok(Event::Eof) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    warn!(
                        "Feed document is not well-formed at byte {}: {}",
                        self.reader.buffer_position(),
                        e
                    );
                    self.finished = true;
                    return None;
                }
                _ => {}
            }
            self.buf.clear();

            if let Some(builder) = completed {
                match builder.build() {
                    Ok(record) => return Some(record),
                    Err(e) => debug!("Skipping feed entry: {}", e),
                }
            }
        }
    }
}

/// Parse a feed document into package records
pub fn parse_feed(document: &str) -> Vec<PackageRecord> {
    FeedEntries::new(document).collect()
}

/// Parse the `Dependencies` property: `id:version[:framework]` joined by `|`
pub fn parse_dependencies(dependencies: &str) -> Vec<PackageIdentifier> {
    dependencies
        .split('|')
        .filter_map(|dependency| {
            let mut fields = dependency.split(':').map(str::trim);
            let id = fields.next().unwrap_or_default();
            let version = fields.next().unwrap_or_default();
            let framework = fields.next().unwrap_or_default();

            if id.is_empty() || version.is_empty() || !is_supported_framework(framework) {
                return None;
            }
            Some(PackageIdentifier::new(id, version))
        })
        .collect()
}

#[derive(Default)]
struct EntryBuilder {
    id: Option<String>,
    property_id: Option<String>,
    title: Option<String>,
    version: Option<String>,
    description: Option<String>,
    release_notes: Option<String>,
    license_url: Option<String>,
    icon_url: Option<String>,
    download_url: Option<String>,
    dependencies: Option<String>,
}

impl EntryBuilder {
    fn set(&mut self, tag: &str, in_properties: bool, text: String) {
        if !in_properties {
            if tag == "title" {
                self.id = Some(text);
            }
            return;
        }

        match tag {
            "Id" => self.property_id = Some(text),
            "Title" => self.title = Some(text),
            "Version" => self.version = Some(text),
            "Description" => self.description = Some(text),
            "ReleaseNotes" => self.release_notes = Some(text),
            "LicenseUrl" => self.license_url = Some(text),
            "IconUrl" => self.icon_url = Some(text),
            "Dependencies" => self.dependencies = Some(text),
            _ => {}
        }
    }

    fn build(self) -> Result<PackageRecord> {
        let id = self
            .id
            .or(self.property_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::MalformedFeedEntry("Missing package id".to_string()))?;

        let version = self
            .version
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::MalformedFeedEntry(format!("Missing version for {}", id)))?;

        let title = self
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| id.clone());

        let dependencies = self
            .dependencies
            .as_deref()
            .map(parse_dependencies)
            .unwrap_or_default();

        Ok(PackageRecord {
            id,
            version,
            title,
            description: self.description,
            release_notes: self.release_notes,
            license_url: self.license_url,
            icon_url: self.icon_url,
            download_url: self.download_url,
            source: None,
            dependencies,
        })
    }
}
