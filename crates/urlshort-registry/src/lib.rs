//! URL registry service.
//!
//! [`Registry`] allocates short ids, deduplicates original urls through the
//! storage backend and hands owner deletions to a [`DeletionPipeline`] that
//! applies them in batches. Storage types are re-exported from
//! `urlshort_core`.

pub mod error;
pub mod pipeline;
pub mod registry;
pub mod settings;

#[cfg(test)]
mod testing;

pub use error::{RegistryError, Result};
pub use pipeline::{DeletionPipeline, PipelineState};
pub use registry::Registry;
pub use settings::{DeletionSettings, RegistrySettings};
pub use urlshort_core::{Deletion, ShortLink, StorageBackend};
