//! Error types for the storage layer.

use thiserror::Error;

/// Errors that can occur while opening or using a store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A mandatory connection option is absent, the backend cannot be opened.
    #[error("missing mandatory store option '{0}'")]
    MissingOption(String),

    /// The store URL is not recognized by any backend.
    #[error("unsupported store URL: {0}")]
    UnsupportedUrl(String),

    /// Failed to open the store.
    #[error("failed to open store: {0}")]
    OpenFailed(String),

    /// Underlying store I/O error.
    #[error("store I/O error: {0}")]
    Io(String),

    /// Invalid backend options blob.
    #[error("invalid store options: {0}")]
    InvalidOptions(String),

    /// The logger writer thread is gone.
    #[error("log writer unavailable: {0}")]
    LogWriter(String),
}

impl StorageError {
    /// Create an OpenFailed error.
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    /// Create an Io error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

impl From<zarrs_storage::StorageError> for StorageError {
    fn from(err: zarrs_storage::StorageError) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
