use crate::{CombinedBackend, FileBackend, MemoryBackend, PostgresBackend};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use typed_builder::TypedBuilder;
use urlshort_core::{Result, StorageBackend};

/// Which backend a [`StorageSettings`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Combined,
    Postgres,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Combined => write!(f, "memory+file"),
            BackendKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// Startup storage configuration.
///
/// A database DSN wins over a file path; with neither, links live in memory.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct StorageSettings {
    #[builder(default, setter(strip_option, into))]
    pub database_dsn: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub file_path: Option<PathBuf>,
}

impl StorageSettings {
    pub fn kind(&self) -> BackendKind {
        match (&self.database_dsn, &self.file_path) {
            (Some(_), _) => BackendKind::Postgres,
            (None, Some(_)) => BackendKind::Combined,
            (None, None) => BackendKind::Memory,
        }
    }

    /// Constructs and bootstraps the selected backend.
    pub async fn open(&self) -> Result<Arc<dyn StorageBackend>> {
        let backend: Arc<dyn StorageBackend> = match (&self.database_dsn, &self.file_path) {
            (Some(dsn), _) => Arc::new(PostgresBackend::connect(dsn).await?),
            (None, Some(path)) => Arc::new(CombinedBackend::new(
                MemoryBackend::new(),
                FileBackend::open(path).await?,
            )),
            (None, None) => Arc::new(MemoryBackend::new()),
        };

        backend.bootstrap().await?;
        info!(backend = %self.kind(), "storage backend ready");
        Ok(backend)
    }
}
