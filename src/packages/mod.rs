// src/packages/mod.rs

//! Package identity, metadata records and local archive support
//!
//! Remote feeds and local directories both produce `PackageRecord`s. Local
//! archives are opened through the `ArchiveReader` trait; `NupkgReader` is
//! the default implementation for `.nupkg` files.

pub mod identifier;
pub mod nupkg;
pub mod traits;

pub use identifier::{
    PackageIdentifier, PackageRecord, compare_identity, is_supported_framework, latest_per_id,
    sort_records,
};
pub use nupkg::NupkgReader;
pub use traits::ArchiveReader;
