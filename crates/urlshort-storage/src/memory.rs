use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};
use urlshort_core::{Deletion, Result, ShortLink, StorageBackend, StorageError};

#[derive(Debug, Default)]
struct State {
    /// Every link ever inserted, deleted or not.
    links: HashMap<String, ShortLink>,
    /// original url -> id of the single non-deleted link for that url.
    by_url: HashMap<String, String>,
}

impl State {
    fn existing_for_url(&self, original_url: &str) -> Option<&ShortLink> {
        self.by_url
            .get(original_url)
            .and_then(|id| self.links.get(id))
    }

    fn put(&mut self, link: ShortLink) {
        if !link.deleted {
            self.by_url
                .insert(link.original_url.clone(), link.id.clone());
        }
        self.links.insert(link.id.clone(), link);
    }
}

/// Volatile, dedup-aware backend.
///
/// Both indexes live behind one `RwLock`, so the check for an existing URL
/// and the insert happen atomically: of several concurrent inserts for the
/// same URL exactly one wins and the others observe its record. Lookups by
/// id are O(1); owner scans are O(n).
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    /// Creates a new in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored links, including deleted ones.
    pub fn len(&self) -> usize {
        self.state.read().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads a previously persisted record as-is, bypassing dedup.
    ///
    /// Used for replay; a later record with the same id replaces the earlier one.
    pub fn restore(&self, link: ShortLink) {
        let mut state = self.state.write();
        if let Some(previous) = state.links.get(&link.id) {
            if state.by_url.get(&previous.original_url) == Some(&previous.id) {
                let url = previous.original_url.clone();
                state.by_url.remove(&url);
            }
        }
        if !link.deleted && state.by_url.contains_key(&link.original_url) {
            // Keep the first live record for the url canonical.
            state.links.insert(link.id.clone(), link);
            return;
        }
        state.put(link);
    }

    /// Inserts a batch atomically and returns the records that were added.
    ///
    /// Links whose url already has a live record (stored or earlier in the
    /// batch) are skipped. If any id is taken, nothing is inserted.
    pub fn insert_batch(&self, links: Vec<ShortLink>) -> Result<Vec<ShortLink>> {
        let mut state = self.state.write();

        {
            let mut ids = HashSet::with_capacity(links.len());
            for link in &links {
                if state.links.contains_key(&link.id) || !ids.insert(link.id.as_str()) {
                    return Err(StorageError::IdCollision(link.id.clone()));
                }
            }
        }

        let mut inserted = Vec::with_capacity(links.len());
        for link in links {
            if state.by_url.contains_key(&link.original_url) {
                trace!(url = %link.original_url, "skipping already shortened url in batch");
                continue;
            }
            state.put(link.clone());
            inserted.push(link);
        }
        Ok(inserted)
    }

    /// Removes records added by [`insert`](StorageBackend::insert) or
    /// [`insert_batch`](Self::insert_batch), releasing their urls.
    pub fn forget(&self, links: &[ShortLink]) {
        let mut state = self.state.write();
        for link in links {
            if state.by_url.get(&link.original_url) == Some(&link.id) {
                state.by_url.remove(&link.original_url);
            }
            state.links.remove(&link.id);
        }
    }

    /// Marks matching links deleted and returns the records that changed.
    pub fn apply_deletions(&self, deletions: &[Deletion]) -> Vec<ShortLink> {
        let mut state = self.state.write();
        let mut changed = Vec::new();

        for deletion in deletions {
            let Some(link) = state.links.get_mut(&deletion.link_id) else {
                debug!(id = %deletion.link_id, "deletion for unknown id ignored");
                continue;
            };
            if !link.is_deletable_by(deletion) {
                debug!(
                    id = %deletion.link_id,
                    owner = %deletion.owner_id,
                    "deletion by non-owner ignored"
                );
                continue;
            }
            if link.deleted {
                continue;
            }

            link.deleted = true;
            let tagged = link.clone();
            if state.by_url.get(&tagged.original_url) == Some(&tagged.id) {
                state.by_url.remove(&tagged.original_url);
            }
            changed.push(tagged);
        }

        changed
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn insert(&self, link: ShortLink) -> Result<ShortLink> {
        let mut state = self.state.write();

        if let Some(existing) = state.existing_for_url(&link.original_url) {
            return Err(StorageError::already_exists(existing.clone()));
        }
        if state.links.contains_key(&link.id) {
            return Err(StorageError::IdCollision(link.id));
        }

        state.put(link.clone());
        Ok(link)
    }

    async fn insert_many(&self, links: Vec<ShortLink>) -> Result<()> {
        self.insert_batch(links).map(|_| ())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ShortLink>> {
        Ok(self.state.read().links.get(id).cloned())
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortLink>> {
        Ok(self.state.read().existing_for_url(original_url).cloned())
    }

    async fn get_by_owner(&self, owner_id: &str) -> Result<Vec<ShortLink>> {
        Ok(self
            .state
            .read()
            .links
            .values()
            .filter(|link| link.owner_id == owner_id && !link.deleted)
            .cloned()
            .collect())
    }

    async fn tag_deleted(&self, deletions: &[Deletion]) -> Result<()> {
        self.apply_deletions(deletions);
        Ok(())
    }
}
