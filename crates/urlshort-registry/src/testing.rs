use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use urlshort_core::{Deletion, Result, ShortLink, StorageBackend, StorageError};
use urlshort_storage::MemoryBackend;

/// Memory backend that can fail deletion batches, stall every call, or apply
/// deletions right after a batch insert.
#[derive(Debug, Default)]
pub(crate) struct FlakyBackend {
    inner: MemoryBackend,
    deletion_failures: AtomicUsize,
    tag_deleted_calls: AtomicUsize,
    delay: Option<Duration>,
    after_insert_many: Mutex<Vec<Deletion>>,
}

impl FlakyBackend {
    pub(crate) fn failing_deletions(times: usize) -> Self {
        Self {
            deletion_failures: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn deleting_after_insert_many(deletions: Vec<Deletion>) -> Self {
        Self {
            after_insert_many: Mutex::new(deletions),
            ..Self::default()
        }
    }

    pub(crate) fn tag_deleted_calls(&self) -> usize {
        self.tag_deleted_calls.load(Ordering::SeqCst)
    }

    async fn stall(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn insert(&self, link: ShortLink) -> Result<ShortLink> {
        self.stall().await;
        self.inner.insert(link).await
    }

    async fn insert_many(&self, links: Vec<ShortLink>) -> Result<()> {
        self.stall().await;
        self.inner.insert_many(links).await?;

        let interleaved = std::mem::take(&mut *self.after_insert_many.lock());
        if !interleaved.is_empty() {
            self.inner.tag_deleted(&interleaved).await?;
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ShortLink>> {
        self.stall().await;
        self.inner.get_by_id(id).await
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortLink>> {
        self.stall().await;
        self.inner.get_by_original_url(original_url).await
    }

    async fn get_by_owner(&self, owner_id: &str) -> Result<Vec<ShortLink>> {
        self.stall().await;
        self.inner.get_by_owner(owner_id).await
    }

    async fn tag_deleted(&self, deletions: &[Deletion]) -> Result<()> {
        self.tag_deleted_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.deletion_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.deletion_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Unavailable("injected failure".into()));
        }
        self.stall().await;
        self.inner.tag_deleted(deletions).await
    }
}
