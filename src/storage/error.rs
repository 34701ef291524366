//! Error types for storage operations

use std::fmt;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while writing points
#[derive(Debug, Clone)]
pub enum StorageError {
    /// Backend could not be reached
    ConnectionFailed(String),

    /// Backend answered the write with a non-success status
    WriteRejected { status: u16, body: String },

    /// Write did not complete within the configured timeout
    Timeout(std::time::Duration),

    /// Invalid configuration
    InvalidConfig(String),

    /// Backend-specific error
    BackendError(String),

    /// The backend is not healthy
    UnhealthyBackend(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to storage backend: {}", msg)
            }
            StorageError::WriteRejected { status, body } => {
                write!(f, "write rejected with status {}: {}", status, body)
            }
            StorageError::Timeout(after) => write!(f, "write timed out after {:?}", after),
            StorageError::InvalidConfig(msg) => write!(f, "invalid storage configuration: {}", msg),
            StorageError::BackendError(msg) => write!(f, "storage backend error: {}", msg),
            StorageError::UnhealthyBackend(msg) => write!(f, "storage backend unhealthy: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            StorageError::ConnectionFailed(err.to_string())
        } else if err.is_builder() {
            StorageError::InvalidConfig(err.to_string())
        } else {
            StorageError::BackendError(err.to_string())
        }
    }
}
