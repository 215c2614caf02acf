//! Outbox drain: pushing locally-captured records and their blobs upstream.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{
    CapturedItem, Collection, CollectionId, CollectionRecord, EntityKind, ItemId, ItemRecord,
    OwnerId, RemoteRecord, SyncState,
};
use crate::remote::{ObjectStore, RecordStore};
use crate::services::LocalStore;

use super::events::{EventBus, SyncEvent};
use super::report::{SyncFailure, SyncReport};

/// Pushes `pending` and `failed` records to the remote stores.
///
/// Drains are single-flight: a pass that starts while another is in flight
/// returns immediately with `already_running` set. One record failing never
/// stops the rest of the pass.
pub struct OutboxEngine {
    store: LocalStore,
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    events: EventBus,
    gate: Mutex<()>,
}

impl OutboxEngine {
    pub fn new(
        store: LocalStore,
        records: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            records,
            objects,
            events,
            gate: Mutex::new(()),
        }
    }

    /// Upload everything that needs it, oldest-first, collections before
    /// items so parents exist remotely by the time their items land.
    pub async fn drain_pending(&self) -> Result<SyncReport> {
        let Ok(_guard) = self.gate.try_lock() else {
            tracing::debug!("Outbox drain already in flight, skipping");
            return Ok(SyncReport::already_running());
        };

        let owner = self
            .records
            .current_identity()
            .await?
            .ok_or(Error::NotAuthenticated)?;

        let mut report = SyncReport::default();

        for collection in self.store.collections_needing_sync().await? {
            report.attempted += 1;
            self.drain_collection(&collection, &owner, &mut report).await?;
        }
        for item in self.store.items_needing_sync().await? {
            report.attempted += 1;
            self.drain_item(&item, &owner, &mut report).await?;
        }

        tracing::info!(
            synced = report.synced,
            requeued = report.requeued,
            failed = report.failures.len(),
            "Outbox drain finished"
        );
        self.events.emit(SyncEvent::OutboxDrained {
            synced: report.synced,
            failed: report.failures.len(),
        });
        Ok(report)
    }

    async fn drain_collection(
        &self,
        collection: &Collection,
        owner: &OwnerId,
        report: &mut SyncReport,
    ) -> Result<()> {
        let snapshot = collection.updated_at;
        match self
            .store
            .mark_collection_state(&collection.id, SyncState::Syncing)
            .await
        {
            Ok(()) => {}
            // Removed between the queue snapshot and now; nothing to upload.
            Err(Error::NotFound(_)) => {
                tracing::debug!("Collection {} removed before its upload", collection.id);
                return Ok(());
            }
            Err(error) => return Err(error),
        }

        match self.push_collection(collection, owner).await {
            Ok(()) => {
                if self
                    .store
                    .mark_collection_synced_if_unchanged(&collection.id, snapshot)
                    .await?
                {
                    report.synced += 1;
                } else {
                    // Edited mid-upload; the edit already re-queued the row.
                    report.requeued += 1;
                }
                self.events.emit(SyncEvent::EntityChanged {
                    entity: EntityKind::Collection,
                    id: collection.id.as_str(),
                });
            }
            Err(error) => {
                tracing::warn!("Upload failed for collection {}: {error}", collection.id);
                match self
                    .store
                    .mark_collection_state(&collection.id, SyncState::Failed)
                    .await
                {
                    Ok(()) => {}
                    // Deleted mid-upload; the failure is moot.
                    Err(Error::NotFound(_)) => return Ok(()),
                    Err(mark_error) => return Err(mark_error),
                }
                report.failures.push(SyncFailure {
                    entity: EntityKind::Collection,
                    id: collection.id.as_str(),
                    message: error.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn drain_item(
        &self,
        item: &CapturedItem,
        owner: &OwnerId,
        report: &mut SyncReport,
    ) -> Result<()> {
        let snapshot = item.updated_at;
        match self.store.mark_item_state(&item.id, SyncState::Syncing).await {
            Ok(()) => {}
            // Removed between the queue snapshot and now; nothing to upload.
            Err(Error::NotFound(_)) => {
                tracing::debug!("Item {} removed before its upload", item.id);
                return Ok(());
            }
            Err(error) => return Err(error),
        }

        match self.push_item(item, owner).await {
            Ok(()) => {
                if self
                    .store
                    .mark_item_synced_if_unchanged(&item.id, snapshot)
                    .await?
                {
                    report.synced += 1;
                } else {
                    report.requeued += 1;
                }
                self.events.emit(SyncEvent::EntityChanged {
                    entity: EntityKind::Item,
                    id: item.id.as_str(),
                });
            }
            Err(error) => {
                tracing::warn!("Upload failed for item {}: {error}", item.id);
                match self.store.mark_item_state(&item.id, SyncState::Failed).await {
                    Ok(()) => {}
                    // Deleted mid-upload; the failure is moot.
                    Err(Error::NotFound(_)) => return Ok(()),
                    Err(mark_error) => return Err(mark_error),
                }
                report.failures.push(SyncFailure {
                    entity: EntityKind::Item,
                    id: item.id.as_str(),
                    message: error.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn push_collection(&self, collection: &Collection, owner: &OwnerId) -> Result<()> {
        let record = CollectionRecord::from_collection(collection, owner);
        self.records
            .upsert(RemoteRecord::Collection(record))
            .await?;
        self.store.record_collection_owner(&collection.id, owner).await
    }

    /// Blobs first, then the structured record, so a record never references
    /// an object that is not there yet.
    async fn push_item(&self, item: &CapturedItem, owner: &OwnerId) -> Result<()> {
        let base = format!("users/{}/items/{}", owner.as_str(), item.id);

        let image_bytes = tokio::fs::read(&item.image_path).await?;
        let image_key = format!("{base}/image.jpg");
        self.objects
            .upload(&image_key, &image_bytes, Some("image/jpeg"))
            .await?;

        let thumbnail_key = match &item.thumbnail_path {
            Some(path) => {
                let bytes = tokio::fs::read(path).await?;
                let key = format!("{base}/thumb.jpg");
                self.objects.upload(&key, &bytes, Some("image/jpeg")).await?;
                Some(key)
            }
            None => None,
        };

        let voice_key = match &item.voice {
            Some(voice) => {
                let bytes = tokio::fs::read(&voice.audio_path).await?;
                let key = format!("{base}/voice.wav");
                self.objects.upload(&key, &bytes, Some("audio/wav")).await?;
                Some(key)
            }
            None => None,
        };

        self.store
            .record_uploaded_paths(
                &item.id,
                owner,
                &image_key,
                thumbnail_key.as_deref(),
                voice_key.as_deref(),
            )
            .await?;

        let record = ItemRecord::from_item(item, owner, image_key, thumbnail_key, voice_key);
        self.records.upsert(RemoteRecord::Item(record)).await?;
        Ok(())
    }

    /// Delete an item locally, then clean up its remote footprint best-effort.
    ///
    /// The local row goes first so the UI never resurrects a deleted item;
    /// remote failures are logged, not returned.
    pub async fn delete_item(&self, id: &ItemId) -> Result<()> {
        let Some(item) = self.store.get_item(id).await? else {
            return Ok(());
        };

        self.store.delete_item(id).await?;
        self.events.emit(SyncEvent::EntityRemoved {
            entity: EntityKind::Item,
            id: id.as_str(),
        });

        if item.owner_id.is_none() {
            return Ok(());
        }

        if let Err(error) = self.records.delete(EntityKind::Item, &id.as_str()).await {
            tracing::warn!("Remote delete failed for item {id}: {error}");
        }

        let keys: Vec<String> = [
            item.remote_image_path,
            item.remote_thumbnail_path,
            item.voice.and_then(|voice| voice.remote_audio_path),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !keys.is_empty() {
            if let Err(error) = self.objects.delete(&keys).await {
                tracing::warn!("Blob cleanup failed for item {id}: {error}");
            }
        }
        Ok(())
    }

    /// Delete a collection locally (items survive, detached) and best-effort
    /// remotely.
    pub async fn delete_collection(&self, id: &CollectionId) -> Result<()> {
        let Some(collection) = self.store.get_collection(id).await? else {
            return Ok(());
        };

        self.store
            .remove_entity(EntityKind::Collection, &id.as_str())
            .await?;
        self.events.emit(SyncEvent::EntityRemoved {
            entity: EntityKind::Collection,
            id: id.as_str(),
        });

        if collection.owner_id.is_some() {
            if let Err(error) = self
                .records
                .delete(EntityKind::Collection, &id.as_str())
                .await
            {
                tracing::warn!("Remote delete failed for collection {id}: {error}");
            }
        }
        Ok(())
    }
}
