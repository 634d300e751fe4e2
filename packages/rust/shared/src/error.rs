//! Error types for Archivist.
//!
//! Library crates use [`ArchivistError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Archivist operations.
#[derive(Debug, thiserror::Error)]
pub enum ArchivistError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A configuration problem that makes the whole run impossible
    /// (e.g. no archivers registered). Raised before any URL is processed.
    #[error("fatal configuration error: {message}")]
    FatalConfiguration { message: String },

    /// Network/HTTP error during capture.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or input parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Ledger (database) layer error.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, missing local file, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ArchivistError>;

impl ArchivistError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a fatal configuration error.
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::FatalConfiguration {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfiguration { .. })
    }
}
