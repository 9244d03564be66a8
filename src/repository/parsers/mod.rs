// src/repository/parsers/mod.rs

//! Feed response parsers
//!
//! Remote feeds speak a single protocol: OData queries answered with Atom
//! XML documents. `atom` turns those documents into `PackageRecord`s.

pub mod atom;

pub use atom::{FeedEntries, parse_dependencies, parse_feed};
