use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What failed.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A conditional write lost against a concurrent writer, or a uniqueness rule was hit.
    #[error("storage conflict: {message}")]
    Conflict {
        /// What collided.
        message: String,
    },
    /// A stored row violates an invariant and cannot be loaded.
    #[error("corrupt record: {message}")]
    Corrupt {
        /// Which record is broken and how.
        message: String,
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

    /// Construct a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        StorageError::Conflict {
            message: message.into(),
        }
    }

    /// Construct a corrupt-record error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        StorageError::Corrupt {
            message: message.into(),
        }
    }
}
