use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WranglerError {
    #[error("unknown data format: {0}")]
    UnknownFormat(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("spreadsheet conversion failed: {0}")]
    Spreadsheet(String),

    #[error("vector conversion failed: {0}")]
    VectorConversion(String),

    #[error("a data_url must exist to download {0}")]
    MissingUrl(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("document store error: {0}")]
    Store(String),

    #[error("duplicate natural key in {collection}: {key}")]
    Conflict { collection: String, key: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("{path} is {size} bytes, larger than the {limit} byte import limit")]
    Oversized { path: PathBuf, size: u64, limit: u64 },

    #[error("unable to determine the delimiter of {0}")]
    UndetectableDelimiter(PathBuf),

    #[error("invalid source descriptor: {0}")]
    InvalidSource(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("publish target rejected the credentials (HTTP 401) for {0}")]
    Unauthorized(String),
}
