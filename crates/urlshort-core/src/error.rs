use crate::link::ShortLink;
use thiserror::Error;

/// Result type for storage backend operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A non-deleted record with the same original URL exists. Carries that record.
    #[error("original url already shortened as {}", .0.id)]
    AlreadyExists(Box<ShortLink>),
    #[error("short id already taken: {0}")]
    IdCollision(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

impl StorageError {
    pub fn already_exists(link: ShortLink) -> Self {
        Self::AlreadyExists(Box::new(link))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}
