//! Common error types for riverstat

use thiserror::Error;

/// Common result type for riverstat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the aggregation engine and its callers
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed detection or request parameter
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backing store could not complete the read or write
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Serialization on a hot key did not complete within its wait budget
    #[error("Contention: {0}")]
    Contention(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failed operation may succeed if attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Contention(_))
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}
