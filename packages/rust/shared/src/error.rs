//! Error types for bundleworks.
//!
//! Library crates use [`BundleworksError`] via `thiserror`.
//! The server binary wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all bundleworks operations.
#[derive(Debug, thiserror::Error)]
pub enum BundleworksError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Source-control API error (branch/project lookup).
    #[error("scm error: {0}")]
    Scm(String),

    /// Ledger or database layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A row or directory that must be unique already exists.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// A shell command exited non-zero or failed to spawn.
    #[error("command failed: {command}: {detail}")]
    Command { command: String, detail: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Request validation error (unknown project, disallowed branch, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BundleworksError>;

impl BundleworksError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a conflict error from any displayable message.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a command error carrying the command line and captured output.
    pub fn command(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a uniqueness conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BundleworksError::config("missing storage path");
        assert_eq!(err.to_string(), "config error: missing storage path");

        let err = BundleworksError::conflict("revision abc123 already recorded");
        assert!(err.is_conflict());
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn command_error_carries_output() {
        let err = BundleworksError::command("npm run build", "exit status 1: module not found");
        assert!(err.to_string().contains("npm run build"));
        assert!(err.to_string().contains("module not found"));
    }
}
