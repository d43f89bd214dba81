//! Error types for fetching, extraction, persistence and site configuration

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure retrieving a page over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A detail page could not be turned into a record. Never aborts a catalog walk.
#[derive(Debug, Error)]
pub enum ExtractionFailure {
    #[error("detail page unavailable: {0}")]
    Unavailable(#[from] FetchError),
    #[error("detail page {url} has no content")]
    EmptyPage { url: String },
}

/// The persisted table could not be read or written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read table {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("table {} has no header row", path.display())]
    MissingHeader { path: PathBuf },
    #[error("failed to write table {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to replace {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

/// A site definition that cannot be used as given.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid selector '{selector}' for {owner}: {message}")]
    InvalidSelector {
        owner: String,
        selector: String,
        message: String,
    },
    #[error("field '{field}' needs a '{key}' selector")]
    MissingSelector { field: String, key: &'static str },
    #[error("site '{site}' has no base URL; pass --base-url")]
    MissingBaseUrl { site: String },
    #[error("site '{site}' has no link selectors")]
    NoLinkSelectors { site: String },
}
