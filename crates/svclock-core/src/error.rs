//! Error types for the service lock registry.
//!
//! Contention on a slot and a missing record are ordinary outcomes and are
//! reported through `Option`, not through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the service lock registry.
#[derive(Debug, Error)]
pub enum SvcLockError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Enumeration addressed an identity that never registered a service.
    #[error("No services have been registered under {path}")]
    RegistryNotFound { path: PathBuf },

    // Validation errors
    #[error("Invalid service name {name:?}: {reason}")]
    InvalidServiceName { name: String, reason: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Background task failed: {message}")]
    TaskJoin { message: String },
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, SvcLockError>;

impl From<std::io::Error> for SvcLockError {
    fn from(err: std::io::Error) -> Self {
        SvcLockError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<tokio::task::JoinError> for SvcLockError {
    fn from(err: tokio::task::JoinError) -> Self {
        SvcLockError::TaskJoin {
            message: err.to_string(),
        }
    }
}

impl SvcLockError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SvcLockError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a service name validation error.
    pub fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        SvcLockError::InvalidServiceName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the error means the identity has no registry location yet.
    pub fn is_registry_not_found(&self) -> bool {
        matches!(self, SvcLockError::RegistryNotFound { .. })
    }
}
