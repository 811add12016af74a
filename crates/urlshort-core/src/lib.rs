//! Core types and traits for the urlshort registry.
//!
//! This crate provides the shared record types and the storage contract
//! used by the storage backends and by the registry service.

pub mod backend;
pub mod error;
pub mod link;

pub use backend::StorageBackend;
pub use error::{Result, StorageError};
pub use link::{Deletion, ShortLink};
