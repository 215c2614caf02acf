//! keepsake-core - Core library for Keepsake
//!
//! This crate contains the offline-first sync engine shared by all Keepsake
//! clients: the durable local store, the outbox/pull/live-feed engines, the
//! remote record- and object-store backends, and media derivation helpers.

pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use models::{CapturedItem, Collection, CollectionId, ItemId, OwnerId, SyncState};
pub use services::LocalStore;
