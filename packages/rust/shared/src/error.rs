//! Error types for KeywordKit.
//!
//! Library crates use [`KeywordKitError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all KeywordKit operations.
#[derive(Debug, thiserror::Error)]
pub enum KeywordKitError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Run-record store error (duplicate key, poisoned lock, ...).
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error, including artifact writes.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad id, malformed payload, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Delivering a message back to the requester failed.
    #[error("notify error: {0}")]
    Notify(String),

    /// The job queue is full or closed.
    #[error("queue error: {0}")]
    Queue(String),

    /// HTTP server startup or runtime error.
    #[error("server error: {0}")]
    Server(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KeywordKitError>;

impl KeywordKitError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = KeywordKitError::config("missing download token");
        assert_eq!(err.to_string(), "config error: missing download token");

        let err = KeywordKitError::validation("batch id 'xyz' is not a UUID");
        assert!(err.to_string().contains("'xyz'"));

        let err = KeywordKitError::io(
            "/nope/report.pdf",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("report.pdf"));
        assert!(err.to_string().contains("denied"));
    }
}
