//! Error types for the quayd daemon

use thiserror::Error;

/// Main error type for the quayd daemon
#[derive(Error, Debug)]
pub enum QuayError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Command failed: {command}: {detail}")]
    CommandFailed {
        /// The shell command that was executed
        command: String,
        /// Combined stdout and stderr of the failed command
        detail: String,
    },

    #[error("Filesystem error: {0}")]
    FilesystemError(String),

    #[error("Permission denied: {0}")]
    PermissionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuayError {
    /// Whether this error is an EACCES-style failure that warrants one
    /// elevation retry in the proxy controller.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            QuayError::IoError(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            QuayError::PermissionError(_) => true,
            QuayError::CommandFailed { detail, .. } => {
                detail.contains("Permission denied") || detail.contains("Operation not permitted")
            }
            _ => false,
        }
    }
}

impl From<anyhow::Error> for QuayError {
    fn from(err: anyhow::Error) -> Self {
        QuayError::Internal(err.to_string())
    }
}
