use crate::error::Result;
use crate::link::{Deletion, ShortLink};
use async_trait::async_trait;

/// Persistence contract for short links.
///
/// A backend is selected once at startup and shared behind an `Arc` by the
/// registry and the deletion pipeline. Records are never physically removed;
/// deletion only sets [`ShortLink::deleted`].
///
/// Backends differ in how strong their uniqueness guarantees are. Every
/// backend rejects a reused id with [`StorageError::IdCollision`]. A
/// dedup-aware backend additionally keeps at most one non-deleted record per
/// original URL and reports [`StorageError::AlreadyExists`] with the existing
/// record instead of inserting a duplicate.
///
/// [`StorageError::IdCollision`]: crate::StorageError::IdCollision
/// [`StorageError::AlreadyExists`]: crate::StorageError::AlreadyExists
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Runs one-time startup work such as schema creation or replay.
    async fn bootstrap(&self) -> Result<()> {
        Ok(())
    }

    /// Persists a new link and returns the stored record.
    ///
    /// Returns `Err(AlreadyExists(existing))` on a dedup hit and
    /// `Err(IdCollision)` if the id is already taken.
    async fn insert(&self, link: ShortLink) -> Result<ShortLink>;

    /// Persists several links with the same per-record semantics as [`insert`].
    ///
    /// Duplicates by original URL are skipped silently; callers that need the
    /// canonical ids re-resolve them with [`get_by_original_url`].
    ///
    /// [`insert`]: StorageBackend::insert
    /// [`get_by_original_url`]: StorageBackend::get_by_original_url
    async fn insert_many(&self, links: Vec<ShortLink>) -> Result<()>;

    /// Returns the record for `id` whether or not it is deleted.
    /// Returns `None` only if the id was never inserted.
    async fn get_by_id(&self, id: &str) -> Result<Option<ShortLink>>;

    /// Returns the canonical non-deleted record for `original_url`, if any.
    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortLink>>;

    /// Returns the non-deleted records owned by `owner_id`, in no particular order.
    async fn get_by_owner(&self, owner_id: &str) -> Result<Vec<ShortLink>>;

    /// Marks every matching link as deleted.
    ///
    /// Entries whose owner does not match the stored record, or whose id is
    /// unknown, are skipped without error.
    async fn tag_deleted(&self, deletions: &[Deletion]) -> Result<()>;

    /// Liveness check.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Releases held resources such as file handles or connection pools.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
