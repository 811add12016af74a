//! Storage backends for the urlshort registry.
//!
//! Four interchangeable implementations of [`StorageBackend`]:
//!
//! - [`MemoryBackend`]: volatile, dedup-aware.
//! - [`FileBackend`]: append-only JSON lines, id-unique only.
//! - [`CombinedBackend`]: memory reads with file durability and replay.
//! - [`PostgresBackend`]: relational, dedup-aware through a unique index.
//!
//! [`StorageSettings::open`] picks one of them once at startup.

pub mod combined;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod settings;

pub use combined::CombinedBackend;
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;
pub use settings::{BackendKind, StorageSettings};
pub use urlshort_core::{Deletion, Result, ShortLink, StorageBackend, StorageError};
