//! Captured item model

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

use super::collection::CollectionId;
use super::owner::OwnerId;
use super::sync_state::SyncState;
use super::voice::VoiceClip;

/// A unique identifier for a captured item, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Create a new unique item ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Visibility tag carried on remote records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to the owner only
    Private,
    /// Visible through the shared feed
    Shared,
}

impl Visibility {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Shared => "shared",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "shared" => Ok(Self::Shared),
            other => Err(Error::InvalidInput(format!("Unknown visibility: {other}"))),
        }
    }
}

/// A photo journal entry captured on this device or materialized from remote.
///
/// Binary payloads live as files under the store's media directory; rows only
/// carry their paths. `remote_*` paths are filled in once the outbox engine
/// has uploaded the blobs (or when the item was materialized from a pull).
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedItem {
    /// Unique identifier
    pub id: ItemId,
    /// Owner identity, set once the item has touched the remote store
    pub owner_id: Option<OwnerId>,
    /// Parent collection, if any
    pub collection_id: Option<CollectionId>,
    /// Free-text caption
    pub caption: String,
    /// Local file holding the primary image
    pub image_path: PathBuf,
    /// Local file holding the derived thumbnail, if generated
    pub thumbnail_path: Option<PathBuf>,
    /// Object-store path of the uploaded primary image
    pub remote_image_path: Option<String>,
    /// Object-store path of the uploaded thumbnail
    pub remote_thumbnail_path: Option<String>,
    /// Attached voice clip, owned exclusively by this item
    pub voice: Option<VoiceClip>,
    /// Visibility tag
    pub visibility: Visibility,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last mutation timestamp (Unix ms); the sole conflict-resolution signal
    pub updated_at: i64,
    /// Outbox sync state
    pub sync_state: SyncState,
}

impl CapturedItem {
    /// Create a new locally-captured item in `Pending` state.
    #[must_use]
    pub fn new(image_path: impl Into<PathBuf>, caption: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: ItemId::new(),
            owner_id: None,
            collection_id: None,
            caption: caption.into(),
            image_path: image_path.into(),
            thumbnail_path: None,
            remote_image_path: None,
            remote_thumbnail_path: None,
            voice: None,
            visibility: Visibility::Private,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Pending,
        }
    }

    /// Attach the item to a collection.
    #[must_use]
    pub fn with_collection(mut self, collection_id: CollectionId) -> Self {
        self.collection_id = Some(collection_id);
        self
    }

    /// Attach a voice clip.
    #[must_use]
    pub fn with_voice(mut self, voice: VoiceClip) -> Self {
        self.voice = Some(voice);
        self
    }

    /// Set the visibility tag.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_unique_and_parseable() {
        let id1 = ItemId::new();
        let id2 = ItemId::new();
        assert_ne!(id1, id2);

        let parsed: ItemId = id1.as_str().parse().unwrap();
        assert_eq!(parsed, id1);
    }

    #[test]
    fn new_item_starts_pending_and_private() {
        let item = CapturedItem::new("photos/1.jpg", "first light");
        assert_eq!(item.sync_state, SyncState::Pending);
        assert_eq!(item.visibility, Visibility::Private);
        assert_eq!(item.created_at, item.updated_at);
        assert!(item.owner_id.is_none());
        assert!(item.remote_image_path.is_none());
    }

    #[test]
    fn builder_helpers_attach_fields() {
        let collection = CollectionId::new();
        let item = CapturedItem::new("photos/1.jpg", "")
            .with_collection(collection)
            .with_visibility(Visibility::Shared);
        assert_eq!(item.collection_id, Some(collection));
        assert_eq!(item.visibility, Visibility::Shared);
    }
}
