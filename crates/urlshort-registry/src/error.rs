use thiserror::Error;
use urlshort_core::{ShortLink, StorageError};

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The url is already shortened; carries the canonical record.
    #[error("original url already shortened as {}", .0.id)]
    AlreadyExists(Box<ShortLink>),
    #[error("short link not found: {0}")]
    NotFound(String),
    #[error("could not allocate a free id, last candidate was {0}")]
    IdCollision(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl RegistryError {
    /// Returns the existing record carried by [`RegistryError::AlreadyExists`].
    pub fn existing(&self) -> Option<&ShortLink> {
        match self {
            RegistryError::AlreadyExists(link) => Some(&**link),
            _ => None,
        }
    }
}

impl From<StorageError> for RegistryError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::AlreadyExists(link) => Self::AlreadyExists(link),
            StorageError::IdCollision(id) => Self::IdCollision(id),
            other @ (StorageError::Unavailable(_)
            | StorageError::Timeout(_)
            | StorageError::Query(_)
            | StorageError::InvalidData(_)) => Self::StorageUnavailable(other.to_string()),
        }
    }
}
