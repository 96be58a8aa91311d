use thiserror::Error;

/// Errors raised by a durable storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A value could not be encoded before writing.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store could not be opened or is gone.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Any other backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for tether_core::TetherError {
    fn from(e: StorageError) -> Self {
        tether_core::TetherError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
