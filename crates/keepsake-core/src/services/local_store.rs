//! Durable on-device store for captured items and collections.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{CheckpointStore, CollectionRepository, Database, ItemRepository};
use crate::error::Result;
use crate::models::{
    CapturedItem, Collection, CollectionId, EntityKind, ItemId, OwnerId, SyncState,
};

/// Thread-safe service owning all local persistence.
///
/// Every mutation funnels through the inner mutex, giving the sync engines a
/// single-writer discipline over the database: the outbox engine, the pull
/// engine, and the live change listener never race on the same row.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    media_dir: PathBuf,
}

impl LocalStore {
    /// Open the store at the given database path.
    ///
    /// Creates the media directory, runs migrations, and resets any `syncing`
    /// rows left behind by a crash (treated the same as `failed`).
    pub async fn open(
        db_path: impl Into<PathBuf>,
        media_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Self::finish_open(db, media_dir.into()).await
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory(media_dir: impl Into<PathBuf>) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Self::finish_open(db, media_dir.into()).await
    }

    async fn finish_open(db: Database, media_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&media_dir)?;

        let store = Self {
            db: Arc::new(Mutex::new(db)),
            media_dir,
        };

        let reset = store.reset_interrupted().await?;
        if reset > 0 {
            tracing::info!("Requeued {reset} interrupted uploads after restart");
        }

        Ok(store)
    }

    /// Directory holding local media files (downloads land here).
    #[must_use]
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    async fn reset_interrupted(&self) -> Result<u64> {
        let db = self.db.lock().await;
        let items = ItemRepository::new(db.connection())
            .reset_interrupted()
            .await?;
        let collections = CollectionRepository::new(db.connection())
            .reset_interrupted()
            .await?;
        Ok(items + collections)
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// Persist a locally-captured item (state `pending`).
    pub async fn create_item(&self, item: &CapturedItem) -> Result<()> {
        let db = self.db.lock().await;
        ItemRepository::new(db.connection()).create(item).await
    }

    pub async fn get_item(&self, id: &ItemId) -> Result<Option<CapturedItem>> {
        let db = self.db.lock().await;
        ItemRepository::new(db.connection()).get(id).await
    }

    /// List items newest-first.
    pub async fn list_items(&self, limit: usize, offset: usize) -> Result<Vec<CapturedItem>> {
        let db = self.db.lock().await;
        ItemRepository::new(db.connection()).list(limit, offset).await
    }

    /// Items in `pending` or `failed` state, oldest-first.
    pub async fn items_needing_sync(&self) -> Result<Vec<CapturedItem>> {
        let db = self.db.lock().await;
        ItemRepository::new(db.connection()).list_needing_sync().await
    }

    pub async fn mark_item_state(&self, id: &ItemId, state: SyncState) -> Result<()> {
        let db = self.db.lock().await;
        ItemRepository::new(db.connection()).set_state(id, state).await
    }

    /// Guarded `syncing` to `synced` transition; `false` means the item was
    /// edited mid-upload and stays queued for the next drain.
    pub async fn mark_item_synced_if_unchanged(
        &self,
        id: &ItemId,
        snapshot_updated_at: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        ItemRepository::new(db.connection())
            .mark_synced_if_unchanged(id, snapshot_updated_at)
            .await
    }

    /// Update an item's caption as a user mutation (re-queues upload).
    pub async fn update_item_caption(&self, id: &ItemId, caption: &str) -> Result<CapturedItem> {
        let db = self.db.lock().await;
        ItemRepository::new(db.connection())
            .update_caption(id, caption)
            .await
    }

    /// Record uploaded blob paths after a drain step (bookkeeping only).
    pub async fn record_uploaded_paths(
        &self,
        id: &ItemId,
        owner: &OwnerId,
        image_path: &str,
        thumbnail_path: Option<&str>,
        voice_path: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        ItemRepository::new(db.connection())
            .record_uploaded(id, owner, image_path, thumbnail_path, voice_path)
            .await
    }

    /// Delete an item and its dependent blobs: the voice clip row cascades,
    /// and media files under the store's media directory are removed.
    pub async fn delete_item(&self, id: &ItemId) -> Result<()> {
        let item = {
            let db = self.db.lock().await;
            let repo = ItemRepository::new(db.connection());
            let item = repo.get(id).await?;
            repo.remove_by_id(&id.as_str()).await?;
            item
        };

        if let Some(item) = item {
            self.remove_owned_files(&item).await;
        }
        Ok(())
    }

    /// Apply a remote item copy under last-write-wins. Returns whether the
    /// row was written.
    pub async fn apply_remote_item(&self, item: &CapturedItem) -> Result<bool> {
        let db = self.db.lock().await;
        ItemRepository::new(db.connection()).apply_remote(item).await
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    pub async fn create_collection(&self, collection: &Collection) -> Result<()> {
        let db = self.db.lock().await;
        CollectionRepository::new(db.connection())
            .create(collection)
            .await
    }

    pub async fn get_collection(&self, id: &CollectionId) -> Result<Option<Collection>> {
        let db = self.db.lock().await;
        CollectionRepository::new(db.connection()).get(id).await
    }

    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        let db = self.db.lock().await;
        CollectionRepository::new(db.connection()).list().await
    }

    pub async fn collections_needing_sync(&self) -> Result<Vec<Collection>> {
        let db = self.db.lock().await;
        CollectionRepository::new(db.connection())
            .list_needing_sync()
            .await
    }

    pub async fn mark_collection_state(&self, id: &CollectionId, state: SyncState) -> Result<()> {
        let db = self.db.lock().await;
        CollectionRepository::new(db.connection())
            .set_state(id, state)
            .await
    }

    pub async fn mark_collection_synced_if_unchanged(
        &self,
        id: &CollectionId,
        snapshot_updated_at: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        CollectionRepository::new(db.connection())
            .mark_synced_if_unchanged(id, snapshot_updated_at)
            .await
    }

    pub async fn record_collection_owner(&self, id: &CollectionId, owner: &OwnerId) -> Result<()> {
        let db = self.db.lock().await;
        CollectionRepository::new(db.connection())
            .record_owner(id, owner)
            .await
    }

    pub async fn apply_remote_collection(&self, collection: &Collection) -> Result<bool> {
        let db = self.db.lock().await;
        CollectionRepository::new(db.connection())
            .apply_remote(collection)
            .await
    }

    /// Lazily computed item count for a collection.
    pub async fn collection_item_count(&self, id: &CollectionId) -> Result<usize> {
        let db = self.db.lock().await;
        ItemRepository::new(db.connection())
            .count_in_collection(id)
            .await
    }

    /// Cover for a collection: the stored cover path, or the first contained
    /// item's thumbnail (or image) when unset.
    pub async fn collection_cover(&self, id: &CollectionId) -> Result<Option<String>> {
        let db = self.db.lock().await;

        if let Some(collection) = CollectionRepository::new(db.connection()).get(id).await? {
            if collection.cover_remote_path.is_some() {
                return Ok(collection.cover_remote_path);
            }
        } else {
            return Ok(None);
        }

        let first = ItemRepository::new(db.connection())
            .first_in_collection(id)
            .await?;
        Ok(first.map(|item| {
            item.thumbnail_path
                .as_ref()
                .unwrap_or(&item.image_path)
                .to_string_lossy()
                .to_string()
        }))
    }

    // ------------------------------------------------------------------
    // Remote deletes and checkpoints
    // ------------------------------------------------------------------

    /// Remove an entity by wire identity, cascading dependents.
    ///
    /// A no-op returning `false` when no such row exists; delete-of-unknown
    /// is not an error.
    pub async fn remove_entity(&self, entity: EntityKind, id: &str) -> Result<bool> {
        match entity {
            EntityKind::Item => {
                let item = {
                    let db = self.db.lock().await;
                    let repo = ItemRepository::new(db.connection());
                    let item = match id.parse() {
                        Ok(item_id) => repo.get(&item_id).await?,
                        Err(_) => None,
                    };
                    if !repo.remove_by_id(id).await? {
                        return Ok(false);
                    }
                    item
                };
                if let Some(item) = item {
                    self.remove_owned_files(&item).await;
                }
                Ok(true)
            }
            EntityKind::Collection => {
                let db = self.db.lock().await;
                CollectionRepository::new(db.connection()).remove_by_id(id).await
            }
        }
    }

    /// Last successful pull timestamp (Unix ms) for an entity kind.
    pub async fn checkpoint(&self, entity: EntityKind) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        CheckpointStore::new(db.connection()).get(entity).await
    }

    /// Advance a checkpoint; older values are ignored.
    pub async fn advance_checkpoint(&self, entity: EntityKind, last_pulled_at: i64) -> Result<()> {
        let db = self.db.lock().await;
        CheckpointStore::new(db.connection())
            .advance(entity, last_pulled_at)
            .await
    }

    /// Remove an item's media files, but only ones the store owns (files
    /// outside the media directory were supplied by the user).
    async fn remove_owned_files(&self, item: &CapturedItem) {
        let mut paths = vec![item.image_path.clone()];
        if let Some(path) = &item.thumbnail_path {
            paths.push(path.clone());
        }
        if let Some(voice) = &item.voice {
            paths.push(voice.audio_path.clone());
        }

        for path in paths {
            if !path.starts_with(&self.media_dir) {
                continue;
            }
            if let Err(error) = tokio::fs::remove_file(&path).await {
                tracing::debug!("Could not remove media file {}: {error}", path.display());
            }
        }
    }
}
