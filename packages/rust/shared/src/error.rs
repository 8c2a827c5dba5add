//! Error types for Tidymarks.
//!
//! Library crates use [`TidymarksError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only fatal conditions are errors. Per-folder and per-bookmark failures
//! during plan application are collected as run issues by the core crate.

use std::path::PathBuf;

/// Top-level error type for all Tidymarks operations.
#[derive(Debug, thiserror::Error)]
pub enum TidymarksError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The host bookmark tree could not be read or is malformed.
    #[error("could not read bookmark tree: {0}")]
    TreeRead(String),

    /// A single host bookmark store call failed (create, move, list children).
    #[error("bookmark store error: {0}")]
    HostStore(String),

    /// The classifier could not be reached or answered with a non-success status.
    #[error("classifier request failed: {0}")]
    ClassificationTransport(String),

    /// The classifier answered, but not with a usable plan document.
    #[error("classifier returned an invalid plan: {message}")]
    ClassificationParse { message: String },

    /// The plan failed validation and strict mode is enabled.
    #[error("plan rejected: {message}")]
    PlanValidation { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input file, unknown id, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TidymarksError>;

impl TidymarksError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a classification parse error from any displayable message.
    pub fn classification_parse(msg: impl Into<String>) -> Self {
        Self::ClassificationParse {
            message: msg.into(),
        }
    }

    /// Create a plan validation error from any displayable message.
    pub fn plan_validation(msg: impl Into<String>) -> Self {
        Self::PlanValidation {
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
}
