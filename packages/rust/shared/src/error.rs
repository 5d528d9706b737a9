//! Error types for akuforge.
//!
//! Library crates use [`AkuForgeError`] via `thiserror`.
//! The CLI crate wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all akuforge operations.
#[derive(Debug, thiserror::Error)]
pub enum AkuForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Document tree scanning error.
    #[error("scan error: {0}")]
    Scan(String),

    /// Unit or relationship extraction error.
    #[error("extract error: {message}")]
    Extract { message: String },

    /// Graph store / database layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Migration step failure, recorded against a named pipeline step.
    #[error("migration step '{step}' failed: {message}")]
    Migration { step: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AkuForgeError>;

impl AkuForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an extract error from any displayable message.
    pub fn extract(msg: impl Into<String>) -> Self {
        Self::Extract {
            message: msg.into(),
        }
    }

    /// Create a migration step error from a step name and message.
    pub fn migration(step: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Migration {
            step: step.into(),
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
