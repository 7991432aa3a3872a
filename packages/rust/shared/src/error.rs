//! Error types for Leadflow.
//!
//! Library crates use [`LeadflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Leadflow operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadflowError {
    /// Configuration loading or validation error (fatal at startup).
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while scraping or calling a remote API.
    #[error("network error: {0}")]
    Network(String),

    /// Response or document parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// LLM content generation error (API, or unusable response).
    #[error("generation error: {0}")]
    Generation(String),

    /// Message building or mail transport error.
    #[error("mail error: {0}")]
    Mail(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad email address, malformed import row, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadflowError>;

impl LeadflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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

    /// Whether this error should stop the whole run rather than one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Storage(_) | Self::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LeadflowError::config("missing SENDER_1_PASSWORD");
        assert_eq!(err.to_string(), "config error: missing SENDER_1_PASSWORD");

        let err = LeadflowError::validation("row 3 has no email");
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn fatal_classification() {
        assert!(LeadflowError::config("x").is_fatal());
        assert!(LeadflowError::Storage("locked".into()).is_fatal());
        assert!(!LeadflowError::Network("timeout".into()).is_fatal());
        assert!(!LeadflowError::Generation("no html".into()).is_fatal());
    }
}
