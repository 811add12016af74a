use crate::file::FileBackend;
use crate::memory::MemoryBackend;
use async_trait::async_trait;
use tracing::{error, info};
use urlshort_core::{Deletion, Result, ShortLink, StorageBackend};

/// A memory backend made durable by a file backend.
///
/// Every mutation goes to memory first and is then appended to the file;
/// reads are served from memory only. [`bootstrap`] replays the file into
/// memory once at startup. Dedup semantics are those of [`MemoryBackend`].
///
/// If the append fails, the memory change is undone before the error is
/// returned. A call dropped while the append is in flight (for example by a
/// caller's timeout) cannot be undone: memory then holds a change the file
/// may lack, and it is lost on the next restart.
///
/// [`bootstrap`]: StorageBackend::bootstrap
#[derive(Debug)]
pub struct CombinedBackend {
    memory: MemoryBackend,
    file: FileBackend,
}

impl CombinedBackend {
    pub fn new(memory: MemoryBackend, file: FileBackend) -> Self {
        Self { memory, file }
    }

    pub fn memory(&self) -> &MemoryBackend {
        &self.memory
    }

    pub fn file(&self) -> &FileBackend {
        &self.file
    }

    async fn persist(&self, links: &[ShortLink]) -> Result<()> {
        self.file.append(links).await.inspect_err(|err| {
            error!(
                path = %self.file.path().display(),
                records = links.len(),
                error = %err,
                "failed to persist records applied in memory"
            )
        })
    }
}

#[async_trait]
impl StorageBackend for CombinedBackend {
    async fn bootstrap(&self) -> Result<()> {
        let links = self.file.load_all().await?;
        let replayed = links.len();
        for link in links {
            self.memory.restore(link);
        }
        info!(
            path = %self.file.path().display(),
            records = replayed,
            "replayed file storage into memory"
        );
        Ok(())
    }

    async fn insert(&self, link: ShortLink) -> Result<ShortLink> {
        let stored = self.memory.insert(link).await?;
        let written = std::slice::from_ref(&stored);
        self.persist(written)
            .await
            .inspect_err(|_| self.memory.forget(written))?;
        Ok(stored)
    }

    async fn insert_many(&self, links: Vec<ShortLink>) -> Result<()> {
        let inserted = self.memory.insert_batch(links)?;
        self.persist(&inserted)
            .await
            .inspect_err(|_| self.memory.forget(&inserted))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ShortLink>> {
        self.memory.get_by_id(id).await
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortLink>> {
        self.memory.get_by_original_url(original_url).await
    }

    async fn get_by_owner(&self, owner_id: &str) -> Result<Vec<ShortLink>> {
        self.memory.get_by_owner(owner_id).await
    }

    async fn tag_deleted(&self, deletions: &[Deletion]) -> Result<()> {
        let tagged = self.memory.apply_deletions(deletions);
        self.persist(&tagged).await.inspect_err(|_| {
            for link in &tagged {
                self.memory.restore(ShortLink {
                    deleted: false,
                    ..link.clone()
                });
            }
        })
    }

    async fn close(&self) -> Result<()> {
        self.file.close().await
    }
}
