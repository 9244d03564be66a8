// src/lib.rs

//! nuget-feed: NuGet package feed resolution
//!
//! Finds newer versions of installed packages across local directories and
//! remote NuGet v2 (OData/Atom) feeds.
//!
//! # Architecture
//!
//! - Versions: dotted numeric versions with prerelease tags, compared by a
//!   stateless ordering function; interval-notation version ranges
//! - Sources: local `.nupkg` directories and HTTP feeds behind one trait,
//!   queried in configured priority order
//! - Manifest: the project's `packages.config`
//! - Settings: `NuGet.config` with sources, credentials and options
//! - Resolution: bulk `GetUpdates()` queries in batches, falling back to
//!   per-package queries on feeds without that operation

pub mod config;
mod error;
pub mod manifest;
pub mod packages;
pub mod repository;
pub mod resolver;
pub mod version;
mod xml;

pub use error::{Error, Result};
