//! Error types and handling for the scrubbing pipeline

use std::{path::PathBuf, result::Result as StdResult, time::Duration};

use thiserror::Error;

/// Custom result type for scrubbing operations
pub type Result<T> = StdResult<T, Error>;

/// Core error type for scrubbing operations
#[derive(Error, Debug)]
#[non_exhaustive]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Structural rewrite failed: {0}")]
    CollaboratorFailure(#[from] CollaboratorFailure),

    #[error("Not a PDF document: {}", .0.display())]
    NotADocument(PathBuf),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("PDF structure error: {0}")]
    StructureError(#[from] StructureError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Scanner error: {0}")]
    ScannerError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Concurrency error: {0}")]
    ConcurrencyError(String),
}

impl Error {
    /// Whether the pipeline can recover from this error locally.
    ///
    /// Only a failing external rewrite is recoverable: the pipeline falls back
    /// to its first-pass artifact. Everything else is fatal for that input.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::CollaboratorFailure(_))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::ConcurrencyError(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

// -------------------- Sub-Error Categories --------------------

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StructureError {
    #[error("Document has no catalog")]
    MissingCatalog,

    #[error("Invalid object stream: {0}")]
    InvalidObjectStream(String),

    #[error("Unsupported stream filter: {0}")]
    UnsupportedFilter(String),

    #[error("Corrupted structure: {0}")]
    Corrupted(String),

    #[error("Decoded stream exceeds {0} bytes")]
    DecodedTooLarge(usize),
}

/// Why the external structural rewrite did not produce a usable document
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CollaboratorFailure {
    #[error("{tool} could not be started: {reason}")]
    Missing { tool: String, reason: String },

    #[error("{tool} exited with status {code:?}: {stderr}")]
    Exited {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {timeout:?}")]
    TimedOut { tool: String, timeout: Duration },

    #[error("{tool} produced malformed output: {reason}")]
    MalformedOutput { tool: String, reason: String },
}
