// src/packages/traits.rs

//! Common traits for package archive readers

use crate::error::Result;
use crate::packages::identifier::PackageRecord;
use std::path::Path;

/// Opens a package archive on disk and reads its identity and metadata
///
/// Local package sources open every archive through this trait.
pub trait ArchiveReader: Send + Sync {
    /// Read the package metadata stored in the archive at `path`
    ///
    /// The returned record's `download_url` points at the archive itself.
    fn read(&self, path: &Path) -> Result<PackageRecord>;

    /// File extension (without the dot) of archives this reader understands
    fn extension(&self) -> &str;
}
