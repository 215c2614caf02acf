//! Wire representations exchanged with the remote record store.
//!
//! Remote records are flattened DTOs: identity, owner identity, object-store
//! paths instead of raw bytes, a visibility tag, and ISO-8601 timestamps.
//! They are produced by the outbox engine on upload and consumed by the pull
//! engine and the live change listener when merging into the local store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::collection::{Collection, CollectionId};
use super::item::{CapturedItem, ItemId, Visibility};
use super::owner::OwnerId;

/// Entity kinds the sync engines operate on.
///
/// Voice clips ride along inside item records and have no feed of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "items")]
    Item,
    #[serde(rename = "collections")]
    Collection,
}

impl EntityKind {
    /// Remote table / local checkpoint key for this entity kind.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Item => "items",
            Self::Collection => "collections",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "items" => Ok(Self::Item),
            "collections" => Ok(Self::Collection),
            other => Err(Error::InvalidInput(format!("Unknown entity kind: {other}"))),
        }
    }
}

/// Flattened wire record for a captured item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub owner_id: OwnerId,
    pub collection_id: Option<CollectionId>,
    pub caption: String,
    /// Object-store path of the primary image
    pub image_path: String,
    /// Object-store path of the derived thumbnail
    pub thumbnail_path: Option<String>,
    /// Object-store path of the attached voice clip
    pub voice_path: Option<String>,
    pub voice_duration_ms: Option<u64>,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Nested join shape some endpoints return: the parent collection arrives as
/// an embedded object instead of a flat `collection_id` column.
#[derive(Debug, Deserialize)]
struct NestedItemWire {
    collection: NestedCollectionRef,
    #[serde(flatten)]
    base: ItemRecord,
}

#[derive(Debug, Deserialize)]
struct NestedCollectionRef {
    id: CollectionId,
}

impl ItemRecord {
    /// Decode a server payload into the canonical flat record.
    ///
    /// Attempts the nested join shape first and falls back to the flattened
    /// shape, so no other component ever sees the raw variants.
    pub fn from_json(payload: serde_json::Value) -> Result<Self> {
        match serde_json::from_value::<NestedItemWire>(payload.clone()) {
            Ok(wire) => {
                let mut record = wire.base;
                record.collection_id = Some(wire.collection.id);
                Ok(record)
            }
            Err(_) => Ok(serde_json::from_value(payload)?),
        }
    }

    /// Build the wire record for an item whose blobs have been uploaded.
    #[must_use]
    pub fn from_item(
        item: &CapturedItem,
        owner: &OwnerId,
        image_path: String,
        thumbnail_path: Option<String>,
        voice_path: Option<String>,
    ) -> Self {
        Self {
            id: item.id,
            owner_id: owner.clone(),
            collection_id: item.collection_id,
            caption: item.caption.clone(),
            image_path,
            thumbnail_path,
            voice_path,
            voice_duration_ms: item.voice.as_ref().map(|voice| voice.duration_ms),
            visibility: item.visibility,
            created_at: millis_to_datetime(item.created_at),
            updated_at: millis_to_datetime(item.updated_at),
        }
    }
}

/// Flattened wire record for a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: CollectionId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: Option<String>,
    pub cover_path: Option<String>,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectionRecord {
    pub fn from_json(payload: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(payload)?)
    }

    /// Build the wire record for a local collection.
    #[must_use]
    pub fn from_collection(collection: &Collection, owner: &OwnerId) -> Self {
        Self {
            id: collection.id,
            owner_id: owner.clone(),
            name: collection.name.clone(),
            description: collection.description.clone(),
            cover_path: collection.cover_remote_path.clone(),
            visibility: collection.visibility,
            created_at: millis_to_datetime(collection.created_at),
            updated_at: millis_to_datetime(collection.updated_at),
        }
    }
}

/// Canonical in-memory remote record, unified across entity kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteRecord {
    Item(ItemRecord),
    Collection(CollectionRecord),
}

impl RemoteRecord {
    /// Decode a payload for the given entity kind.
    pub fn from_json(entity: EntityKind, payload: serde_json::Value) -> Result<Self> {
        match entity {
            EntityKind::Item => Ok(Self::Item(ItemRecord::from_json(payload)?)),
            EntityKind::Collection => Ok(Self::Collection(CollectionRecord::from_json(payload)?)),
        }
    }

    #[must_use]
    pub const fn entity(&self) -> EntityKind {
        match self {
            Self::Item(_) => EntityKind::Item,
            Self::Collection(_) => EntityKind::Collection,
        }
    }

    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Item(record) => record.id.as_str(),
            Self::Collection(record) => record.id.as_str(),
        }
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::Item(record) => record.updated_at,
            Self::Collection(record) => record.updated_at,
        }
    }

    #[must_use]
    pub fn updated_at_ms(&self) -> i64 {
        self.updated_at().timestamp_millis()
    }
}

/// Event type tag on the live change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single server-pushed change.
///
/// For inserts and updates `record` is a snapshot of the affected row; for
/// deletes it carries at least the deleted row's `id`. The payload stays raw
/// JSON so a malformed event can be skipped without dropping the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(rename = "table")]
    pub entity: EntityKind,
    pub record: serde_json::Value,
}

impl ChangeEvent {
    /// Extract the deleted row's identity from a delete event.
    pub fn deleted_id(&self) -> Result<&str> {
        self.record
            .get("id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::Decode("delete event missing record id".to_string()))
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}
