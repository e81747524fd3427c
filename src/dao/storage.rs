use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be reached or refused the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A uniqueness constraint rejected the write.
    #[error("{what} already exists")]
    Duplicate {
        /// What collided, e.g. "username or email".
        what: &'static str,
    },
    /// The database URL does not match any known backend.
    #[error("unsupported database URL scheme `{scheme}` (expected sqlite or postgres)")]
    UnsupportedScheme {
        /// Scheme part of the offending URL.
        scheme: String,
    },
    /// The URL selects a backend that was not compiled into this build.
    #[error("database backend for `{scheme}` URLs was not compiled in")]
    BackendDisabled {
        /// Scheme of the requested backend.
        scheme: &'static str,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
