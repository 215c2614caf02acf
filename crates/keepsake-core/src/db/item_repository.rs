//! Captured item repository

use std::path::PathBuf;

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{CapturedItem, CollectionId, ItemId, OwnerId, SyncState, VoiceClip};

const ITEM_COLUMNS: &str = "i.id, i.owner_id, i.collection_id, i.caption, i.image_path, \
     i.thumbnail_path, i.remote_image_path, i.remote_thumbnail_path, i.visibility, \
     i.created_at, i.updated_at, i.sync_state, \
     v.audio_path, v.remote_audio_path, v.duration_ms, v.waveform";

const ITEM_FROM: &str = "FROM items i LEFT JOIN voice_clips v ON v.item_id = i.id";

/// libSQL-backed storage for captured items and their voice clips.
pub struct ItemRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ItemRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new locally-captured item (and its voice clip, if any).
    pub async fn create(&self, item: &CapturedItem) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO items (id, owner_id, collection_id, caption, image_path, \
                 thumbnail_path, remote_image_path, remote_thumbnail_path, visibility, \
                 created_at, updated_at, sync_state) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                item_params(item),
            )
            .await?;

        if let Some(voice) = &item.voice {
            self.upsert_voice(&item.id, voice).await?;
        }

        Ok(())
    }

    /// Fetch an item by id.
    pub async fn get(&self, id: &ItemId) -> Result<Option<CapturedItem>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ITEM_COLUMNS} {ITEM_FROM} WHERE i.id = ?1"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_item(&row)?)),
            None => Ok(None),
        }
    }

    /// List items newest-first.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<CapturedItem>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} {ITEM_FROM} \
                     ORDER BY i.created_at DESC LIMIT ?1 OFFSET ?2"
                ),
                params![limit as i64, offset as i64],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(parse_item(&row)?);
        }
        Ok(items)
    }

    /// List items eligible for the next outbox drain, oldest-first.
    pub async fn list_needing_sync(&self) -> Result<Vec<CapturedItem>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} {ITEM_FROM} \
                     WHERE i.sync_state IN ('pending', 'failed') \
                     ORDER BY i.created_at ASC"
                ),
                (),
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(parse_item(&row)?);
        }
        Ok(items)
    }

    /// Set the sync state without touching `updated_at`.
    pub async fn set_state(&self, id: &ItemId, state: SyncState) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE items SET sync_state = ?1 WHERE id = ?2",
                params![state.as_str(), id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Transition `syncing` to `synced`, but only when the row was not
    /// mutated since the drain snapshotted it. Returns `false` when the item
    /// was edited mid-upload and stays queued instead.
    pub async fn mark_synced_if_unchanged(
        &self,
        id: &ItemId,
        snapshot_updated_at: i64,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE items SET sync_state = 'synced' \
                 WHERE id = ?1 AND updated_at = ?2 AND sync_state = 'syncing'",
                params![id.as_str(), snapshot_updated_at],
            )
            .await?;
        Ok(rows > 0)
    }

    /// Update the caption as a user mutation: bumps `updated_at` and
    /// re-queues the item for upload.
    pub async fn update_caption(&self, id: &ItemId, caption: &str) -> Result<CapturedItem> {
        let now = chrono::Utc::now().timestamp_millis();
        let rows = self
            .conn
            .execute(
                "UPDATE items SET caption = ?1, updated_at = ?2, sync_state = 'pending' \
                 WHERE id = ?3",
                params![caption, now, id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get(id).await?.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Record the object-store paths of uploaded blobs.
    ///
    /// Bookkeeping only: does not bump `updated_at`, so an upload finishing
    /// never looks like a user mutation.
    pub async fn record_uploaded(
        &self,
        id: &ItemId,
        owner: &OwnerId,
        image_path: &str,
        thumbnail_path: Option<&str>,
        voice_path: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE items SET owner_id = ?1, remote_image_path = ?2, \
                 remote_thumbnail_path = ?3 WHERE id = ?4",
                params![owner.as_str(), image_path, thumbnail_path, id.as_str()],
            )
            .await?;

        if let Some(voice_path) = voice_path {
            self.conn
                .execute(
                    "UPDATE voice_clips SET remote_audio_path = ?1 WHERE item_id = ?2",
                    params![voice_path, id.as_str()],
                )
                .await?;
        }

        Ok(())
    }

    /// Apply a remote copy under the last-write-wins rule.
    ///
    /// Insert when unknown; overwrite only when the incoming `updated_at` is
    /// strictly newer (ties keep the local row). Returns whether the row was
    /// written.
    pub async fn apply_remote(&self, item: &CapturedItem) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "INSERT INTO items (id, owner_id, collection_id, caption, image_path, \
                 thumbnail_path, remote_image_path, remote_thumbnail_path, visibility, \
                 created_at, updated_at, sync_state) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                 ON CONFLICT(id) DO UPDATE SET \
                   owner_id = excluded.owner_id, \
                   collection_id = excluded.collection_id, \
                   caption = excluded.caption, \
                   image_path = excluded.image_path, \
                   thumbnail_path = excluded.thumbnail_path, \
                   remote_image_path = excluded.remote_image_path, \
                   remote_thumbnail_path = excluded.remote_thumbnail_path, \
                   visibility = excluded.visibility, \
                   updated_at = excluded.updated_at, \
                   sync_state = excluded.sync_state \
                 WHERE excluded.updated_at > items.updated_at",
                item_params(item),
            )
            .await?;

        let applied = rows > 0;
        if applied {
            match &item.voice {
                Some(voice) => self.upsert_voice(&item.id, voice).await?,
                None => {
                    self.conn
                        .execute(
                            "DELETE FROM voice_clips WHERE item_id = ?1",
                            params![item.id.as_str()],
                        )
                        .await?;
                }
            }
        }

        Ok(applied)
    }

    /// Delete an item row by string id; the voice clip row cascades.
    ///
    /// Returns `false` when no such row exists (delete-of-unknown is not an
    /// error).
    pub async fn remove_by_id(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1", params![id])
            .await?;
        Ok(rows > 0)
    }

    /// Reset interrupted uploads after a restart: no in-flight transfer
    /// survives a crash, so `syncing` rows become `failed` and are retried.
    pub async fn reset_interrupted(&self) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE items SET sync_state = 'failed' WHERE sync_state = 'syncing'",
                (),
            )
            .await?;
        Ok(rows)
    }

    /// Lazily computed item count for a collection.
    pub async fn count_in_collection(&self, collection_id: &CollectionId) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM items WHERE collection_id = ?1",
                params![collection_id.as_str()],
            )
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Oldest item in a collection, used as the cover fallback.
    pub async fn first_in_collection(
        &self,
        collection_id: &CollectionId,
    ) -> Result<Option<CapturedItem>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} {ITEM_FROM} \
                     WHERE i.collection_id = ?1 ORDER BY i.created_at ASC LIMIT 1"
                ),
                params![collection_id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_item(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_voice(&self, item_id: &ItemId, voice: &VoiceClip) -> Result<()> {
        let waveform = voice
            .waveform
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO voice_clips (item_id, audio_path, remote_audio_path, \
                 duration_ms, waveform) VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(item_id) DO UPDATE SET \
                   audio_path = excluded.audio_path, \
                   remote_audio_path = excluded.remote_audio_path, \
                   duration_ms = excluded.duration_ms, \
                   waveform = excluded.waveform",
                params![
                    item_id.as_str(),
                    voice.audio_path.to_string_lossy().to_string(),
                    voice.remote_audio_path.clone(),
                    i64::try_from(voice.duration_ms).unwrap_or(i64::MAX),
                    waveform
                ],
            )
            .await?;
        Ok(())
    }
}

fn item_params(item: &CapturedItem) -> impl libsql::params::IntoParams {
    params![
        item.id.as_str(),
        item.owner_id.as_ref().map(|owner| owner.as_str().to_string()),
        item.collection_id.map(|id| id.as_str()),
        item.caption.clone(),
        item.image_path.to_string_lossy().to_string(),
        item.thumbnail_path
            .as_ref()
            .map(|path| path.to_string_lossy().to_string()),
        item.remote_image_path.clone(),
        item.remote_thumbnail_path.clone(),
        item.visibility.as_str(),
        item.created_at,
        item.updated_at,
        item.sync_state.as_str()
    ]
}

fn parse_item(row: &libsql::Row) -> Result<CapturedItem> {
    let id: String = row.get(0)?;
    let collection_id: Option<String> = row.get(2)?;
    let visibility: String = row.get(8)?;
    let sync_state: String = row.get(11)?;

    let voice = match row.get::<Option<String>>(12)? {
        Some(audio_path) => {
            let duration: i64 = row.get::<Option<i64>>(14)?.unwrap_or(0);
            let waveform = row
                .get::<Option<String>>(15)?
                .map(|raw| serde_json::from_str::<Vec<f32>>(&raw))
                .transpose()?;
            Some(VoiceClip {
                audio_path: PathBuf::from(audio_path),
                remote_audio_path: row.get(13)?,
                duration_ms: u64::try_from(duration).unwrap_or(0),
                waveform,
            })
        }
        None => None,
    };

    Ok(CapturedItem {
        id: id
            .parse()
            .map_err(|_| Error::Database(format!("Invalid item id: {id}")))?,
        owner_id: row.get::<Option<String>>(1)?.map(OwnerId::from),
        collection_id: collection_id
            .map(|raw| {
                raw.parse()
                    .map_err(|_| Error::Database(format!("Invalid collection id: {raw}")))
            })
            .transpose()?,
        caption: row.get(3)?,
        image_path: PathBuf::from(row.get::<String>(4)?),
        thumbnail_path: row.get::<Option<String>>(5)?.map(PathBuf::from),
        remote_image_path: row.get(6)?,
        remote_thumbnail_path: row.get(7)?,
        voice,
        visibility: visibility.parse()?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        sync_state: sync_state.parse()?,
    })
}
