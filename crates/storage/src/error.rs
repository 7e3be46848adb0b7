//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact id: {0}")]
    InvalidId(String),

    #[error("range out of bounds: {0}")]
    OutOfRange(String),

    #[error("artifact exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether the error means the artifact is not (or no longer) there.
    ///
    /// Invalid ids count as absent: they never name a stored artifact.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::InvalidId(_))
    }
}

impl From<spool_core::Error> for StorageError {
    fn from(err: spool_core::Error) -> Self {
        match err {
            spool_core::Error::InvalidArtifactId(msg) => Self::InvalidId(msg),
            spool_core::Error::Config(msg) => Self::Config(msg),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
