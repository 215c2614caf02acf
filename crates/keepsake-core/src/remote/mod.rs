//! Remote interfaces: the record store (structured rows plus a live change
//! feed) and the object store (binary blobs).
//!
//! The sync engines only ever see these traits, so tests can drive them with
//! in-memory fakes and failure injection.

mod api;
mod s3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{ChangeEvent, EntityKind, OwnerId, RemoteRecord};

pub use api::{ApiConfig, HttpRecordStore};
pub use s3::{ObjectStoreConfig, S3ObjectStore};

/// Which slice of the change feed a subscription covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    /// Rows owned by a single identity.
    Owned { entity: EntityKind, owner: OwnerId },
    /// The shared feed (rows tagged `shared`, any owner).
    Shared { entity: EntityKind },
}

impl FeedScope {
    #[must_use]
    pub const fn entity(&self) -> EntityKind {
        match self {
            Self::Owned { entity, .. } | Self::Shared { entity } => *entity,
        }
    }
}

/// Structured record storage with incremental reads and a live change feed.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// The authenticated identity, or `None` when signed out.
    async fn current_identity(&self) -> Result<Option<OwnerId>>;

    /// Create or replace a record; returns the stored copy.
    async fn upsert(&self, record: RemoteRecord) -> Result<RemoteRecord>;

    /// Records of one kind owned by `owner` and updated strictly after
    /// `since` (everything when `None`), ordered by `updated_at` ascending.
    async fn changed_since(
        &self,
        entity: EntityKind,
        owner: &OwnerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteRecord>>;

    /// Delete a record by identity. Deleting an absent record is not an error.
    async fn delete(&self, entity: EntityKind, id: &str) -> Result<()>;

    /// Open a live change feed for the given scope.
    ///
    /// The channel closing signals a dropped feed; callers decide whether to
    /// reconnect.
    async fn subscribe(&self, scope: FeedScope) -> Result<mpsc::Receiver<ChangeEvent>>;
}

/// Binary blob storage addressed by object key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload object bytes under the given key, replacing any existing object.
    async fn upload(&self, object_key: &str, bytes: &[u8], content_type: Option<&str>)
        -> Result<()>;

    /// Download object bytes.
    async fn download(&self, object_key: &str) -> Result<Vec<u8>>;

    /// Delete the given objects, continuing past individual failures.
    async fn delete(&self, object_keys: &[String]) -> Result<()>;

    /// Public URL for an object key, when a public base URL is configured.
    fn public_url(&self, object_key: &str) -> Option<String>;
}
