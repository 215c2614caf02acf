//! Collection (album) model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::item::Visibility;
use super::owner::OwnerId;
use super::sync_state::SyncState;

/// A unique identifier for a collection, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionId(Uuid);

impl CollectionId {
    /// Create a new unique collection ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CollectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// An album of captured items.
///
/// Membership is the inverse relationship: items point at their collection.
/// The contained count is computed lazily by query, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    /// Unique identifier
    pub id: CollectionId,
    /// Owner identity, set once the collection has touched the remote store
    pub owner_id: Option<OwnerId>,
    /// Display name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Object-store path of the cover image; falls back to the first
    /// contained item's thumbnail when unset
    pub cover_remote_path: Option<String>,
    /// Visibility tag
    pub visibility: Visibility,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last mutation timestamp (Unix ms); must monotonically increase on
    /// every local or remote-applied mutation
    pub updated_at: i64,
    /// Outbox sync state
    pub sync_state: SyncState,
}

impl Collection {
    /// Create a new local collection in `Pending` state.
    pub fn new(name: impl Into<String>, description: Option<String>) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Collection name cannot be empty".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp_millis();
        Ok(Self {
            id: CollectionId::new(),
            owner_id: None,
            name,
            description: crate::util::normalize_text_option(description),
            cover_remote_path: None,
            visibility: Visibility::Private,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Pending,
        })
    }
}
