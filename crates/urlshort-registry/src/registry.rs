use crate::pipeline::DeletionPipeline;
use crate::settings::RegistrySettings;
use crate::{RegistryError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use urlshort_core::{Deletion, ShortLink, StorageBackend, StorageError};
use urlshort_generator::{Generator, RandomGenerator};

/// The registry service.
///
/// This service wraps a `StorageBackend` and a `Generator` to handle:
/// - id allocation with bounded retry on collisions
/// - url deduplication, reported as [`RegistryError::AlreadyExists`]
/// - owner-scoped deletion through the [`DeletionPipeline`]
///
/// Every storage call is bounded by `operation_timeout`.
pub struct Registry<G = RandomGenerator> {
    backend: Arc<dyn StorageBackend>,
    generator: G,
    pipeline: DeletionPipeline,
    cancel: CancellationToken,
    settings: RegistrySettings,
}

impl<G> std::fmt::Debug for Registry<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("settings", &self.settings)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Registry<RandomGenerator> {
    /// Creates a registry with a random generator of `settings.id_length`.
    ///
    /// Must be called inside a tokio runtime; the deletion worker is spawned
    /// right away.
    pub fn new(backend: Arc<dyn StorageBackend>, settings: RegistrySettings) -> Self {
        let generator = RandomGenerator::new(settings.id_length);
        Self::with_generator(backend, generator, settings)
    }
}

impl<G: Generator> Registry<G> {
    /// Creates a registry with a custom generator.
    pub fn with_generator(
        backend: Arc<dyn StorageBackend>,
        generator: G,
        settings: RegistrySettings,
    ) -> Self {
        let cancel = CancellationToken::new();
        let pipeline = DeletionPipeline::spawn(
            Arc::clone(&backend),
            settings.deletion.clone(),
            cancel.child_token(),
        );

        Self {
            backend,
            generator,
            pipeline,
            cancel,
            settings,
        }
    }

    /// Shortens `original_url` for `owner_id` (which may be empty).
    ///
    /// If a live record for the url exists, fails with
    /// [`RegistryError::AlreadyExists`] carrying that record.
    pub async fn create(&self, original_url: &str, owner_id: &str) -> Result<ShortLink> {
        if original_url.is_empty() {
            return Err(RegistryError::InvalidInput(
                "original url cannot be empty".to_string(),
            ));
        }

        let mut last_candidate = String::new();
        for attempt in 1..=self.attempts() {
            let candidate = ShortLink::new(self.generator.generate(), original_url, owner_id);

            match self.bounded(self.backend.insert(candidate)).await {
                Ok(stored) => {
                    debug!(id = %stored.id, owner = %owner_id, "short link created");
                    return Ok(stored);
                }
                Err(StorageError::IdCollision(id)) => {
                    error!(id = %id, attempt, "generated id already taken");
                    last_candidate = id;
                }
                Err(StorageError::AlreadyExists(existing)) => {
                    debug!(id = %existing.id, "original url already shortened");
                    return Err(RegistryError::AlreadyExists(existing));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(RegistryError::IdCollision(last_candidate))
    }

    /// Shortens many urls at once.
    ///
    /// The result is in input order. Urls that were already shortened, or
    /// that repeat inside the batch, resolve to their canonical record.
    pub async fn create_batch<S: AsRef<str>>(
        &self,
        original_urls: &[S],
        owner_id: &str,
    ) -> Result<Vec<ShortLink>> {
        if original_urls.is_empty() {
            return Ok(Vec::new());
        }
        if original_urls.iter().any(|url| url.as_ref().is_empty()) {
            return Err(RegistryError::InvalidInput(
                "original url cannot be empty".to_string(),
            ));
        }

        let mut stored = None;
        let mut last_collision = String::new();
        for attempt in 1..=self.attempts() {
            let candidates: Vec<ShortLink> = original_urls
                .iter()
                .map(|url| ShortLink::new(self.generator.generate(), url.as_ref(), owner_id))
                .collect();

            match self.bounded(self.backend.insert_many(candidates.clone())).await {
                Ok(()) => {
                    stored = Some(candidates);
                    break;
                }
                Err(StorageError::IdCollision(id)) => {
                    error!(id = %id, attempt, "generated id already taken, retrying batch");
                    last_collision = id;
                }
                Err(err) => return Err(err.into()),
            }
        }
        let Some(candidates) = stored else {
            return Err(RegistryError::IdCollision(last_collision));
        };

        let mut links = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            links.push(self.stored_for(candidate, owner_id).await?);
        }

        debug!(count = links.len(), owner = %owner_id, "short link batch created");
        Ok(links)
    }

    /// Finds the stored record a batch candidate ended up as.
    ///
    /// A skipped duplicate whose live record was deleted before this lookup
    /// leaves nothing behind for the url, so it is shortened again on its own.
    async fn stored_for(&self, candidate: ShortLink, owner_id: &str) -> Result<ShortLink> {
        if let Some(canonical) = self
            .bounded(self.backend.get_by_original_url(&candidate.original_url))
            .await?
        {
            return Ok(canonical);
        }
        if let Some(stored) = self.bounded(self.backend.get_by_id(&candidate.id)).await? {
            return Ok(stored);
        }

        debug!(url = %candidate.original_url, "batch url lost its canonical record, shortening again");
        match self.create(&candidate.original_url, owner_id).await {
            Err(RegistryError::AlreadyExists(existing)) => Ok(*existing),
            other => other,
        }
    }

    /// Looks a link up by id. Deleted links are returned with `deleted` set.
    pub async fn resolve(&self, id: &str) -> Result<ShortLink> {
        if id.is_empty() {
            return Err(RegistryError::InvalidInput(
                "short id cannot be empty".to_string(),
            ));
        }

        self.bounded(self.backend.get_by_id(id))
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Returns the non-deleted links of `owner_id`.
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ShortLink>> {
        Ok(self.bounded(self.backend.get_by_owner(owner_id)).await?)
    }

    /// Queues deletion of `ids` on behalf of `owner_id` and returns at once.
    ///
    /// Returns how many requests were accepted; the rest were rejected
    /// because the queue was full or the registry is shutting down. Ids the
    /// owner does not own are ignored when the batch is applied.
    pub fn delete<S: AsRef<str>>(&self, ids: &[S], owner_id: &str) -> usize {
        ids.iter()
            .map(|id| self.pipeline.enqueue(Deletion::new(owner_id, id.as_ref())))
            .filter(|accepted| *accepted)
            .count()
    }

    pub async fn ping(&self) -> Result<()> {
        Ok(self.bounded(self.backend.ping()).await?)
    }

    pub fn pipeline(&self) -> &DeletionPipeline {
        &self.pipeline
    }

    /// Token whose cancellation starts draining the deletion pipeline.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drains pending deletions and closes the backend.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        let drained = self.pipeline.shutdown().await;

        self.bounded(self.backend.close()).await?;
        info!("registry shut down");
        drained
    }

    fn attempts(&self) -> usize {
        self.settings.create_attempts.max(1)
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = urlshort_core::Result<T>>,
    ) -> urlshort_core::Result<T> {
        let timeout = self.settings.operation_timeout;
        match time::timeout(timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(format!(
                "storage call exceeded {timeout:?}"
            ))),
        }
    }
}
