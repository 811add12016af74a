use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A stored mapping from a generated short identifier to an original URL.
///
/// The serialized field names are the on-disk line format used by the file
/// backend, so they must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortLink {
    /// The short identifier, unique within a backend and never recycled.
    pub id: String,
    /// The original URL that was shortened.
    pub original_url: String,
    /// Opaque owner correlation token, may be empty.
    #[serde(rename = "uuid", default)]
    pub owner_id: String,
    /// Soft-delete marker. Deleted links are kept, never physically removed.
    #[serde(rename = "deleted_flag", default)]
    pub deleted: bool,
}

impl ShortLink {
    /// Creates a new, not deleted link.
    pub fn new(
        id: impl Into<String>,
        original_url: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            original_url: original_url.into(),
            owner_id: owner_id.into(),
            deleted: false,
        }
    }

    /// Returns true if `deletion` targets this link and is issued by its owner.
    pub fn is_deletable_by(&self, deletion: &Deletion) -> bool {
        self.id == deletion.link_id && self.owner_id == deletion.owner_id
    }
}

impl Display for ShortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.id, self.original_url)
    }
}

/// A pending request from `owner_id` to soft-delete `link_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Deletion {
    pub owner_id: String,
    pub link_id: String,
}

impl Deletion {
    pub fn new(owner_id: impl Into<String>, link_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            link_id: link_id.into(),
        }
    }
}
