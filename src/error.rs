// src/error.rs

use thiserror::Error;

/// Core error types for nuget-feed
///
/// Query paths (feed requests, local scans, resolution) never return these to
/// their callers; they are logged and the query degrades to fewer results.
/// Manifest and settings I/O propagate them.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// XML reader/writer errors
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Version string could not be parsed
    #[error("Malformed version: {0}")]
    MalformedVersion(String),

    /// Network or transport failure talking to a feed
    #[error("Feed unavailable: {0}")]
    FeedUnavailable(String),

    /// Feed does not implement the requested operation (e.g. GetUpdates)
    #[error("Unsupported feed operation: {0}")]
    UnsupportedFeedOperation(String),

    /// Feed entry missing required data
    #[error("Malformed feed entry: {0}")]
    MalformedFeedEntry(String),

    /// Package archive could not be read
    #[error("Archive error: {0}")]
    Archive(String),

    /// Settings file is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic parse error
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type alias using nuget-feed's Error type
pub type Result<T> = std::result::Result<T, Error>;
