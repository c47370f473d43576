//! Unified error types for the envbox workspace.
//!
//! Each higher-level crate defines its own domain-specific error enum that wraps
//! these common variants when appropriate.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum EnvboxError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A namespace string failed validation.
    #[error("invalid namespace {value:?}: {reason}")]
    InvalidNamespace {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A lifecycle state string could not be parsed.
    #[error("unknown lifecycle state: {0}")]
    UnknownState(String),

    /// The durable store failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// A permission or capability error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, EnvboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let err = EnvboxError::InvalidNamespace {
            value: "../x".into(),
            reason: "must not contain '/'",
        };
        assert_eq!(err.to_string(), "invalid namespace \"../x\": must not contain '/'");
        assert_eq!(
            EnvboxError::UnknownState("paused".into()).to_string(),
            "unknown lifecycle state: paused"
        );
    }

    #[test]
    fn io_errors_carry_the_path() {
        let err = EnvboxError::Io {
            path: PathBuf::from("/var/lib/envbox"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("I/O error at /var/lib/envbox: "));
    }
}
