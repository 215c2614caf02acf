//! Merging remote records into the local store.
//!
//! Both the pull engine and the live change listener land here, so the
//! last-write-wins rule and blob materialization behave identically no matter
//! how a record arrived.

use std::path::PathBuf;

use crate::error::Result;
use crate::models::{
    CapturedItem, Collection, CollectionRecord, ItemRecord, RemoteRecord, SyncState, VoiceClip,
};
use crate::remote::ObjectStore;
use crate::services::LocalStore;

/// What applying a remote record did locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// No local copy existed; the record was materialized.
    Created,
    /// The record replaced an older local copy.
    Updated,
    /// The local copy was at least as new; nothing changed. Ties keep the
    /// local row.
    Stale,
}

/// Apply one remote record under last-write-wins, downloading blobs first
/// when the record will actually land.
pub async fn apply_remote_record(
    store: &LocalStore,
    objects: &dyn ObjectStore,
    record: &RemoteRecord,
) -> Result<Applied> {
    match record {
        RemoteRecord::Item(item) => apply_item(store, objects, item).await,
        RemoteRecord::Collection(collection) => apply_collection(store, collection).await,
    }
}

async fn apply_item(
    store: &LocalStore,
    objects: &dyn ObjectStore,
    record: &ItemRecord,
) -> Result<Applied> {
    let existing = store.get_item(&record.id).await?;
    let incoming_ms = record.updated_at.timestamp_millis();

    // Freshness pre-check so stale records never cost a blob download.
    if let Some(existing) = &existing {
        if existing.updated_at >= incoming_ms {
            return Ok(Applied::Stale);
        }
    }

    let dir = store.media_dir().join("items").join(record.id.as_str());
    tokio::fs::create_dir_all(&dir).await?;

    let image_path = materialize(objects, &record.image_path, &dir, "image.jpg").await?;
    let thumbnail_path = match &record.thumbnail_path {
        Some(remote) => Some(materialize(objects, remote, &dir, "thumb.jpg").await?),
        None => None,
    };
    let voice = match &record.voice_path {
        Some(remote) => {
            let audio_path = materialize(objects, remote, &dir, "voice.wav").await?;
            Some(VoiceClip {
                audio_path,
                remote_audio_path: Some(remote.clone()),
                duration_ms: record.voice_duration_ms.unwrap_or(0),
                waveform: None,
            })
        }
        None => None,
    };

    let item = CapturedItem {
        id: record.id,
        owner_id: Some(record.owner_id.clone()),
        collection_id: record.collection_id,
        caption: record.caption.clone(),
        image_path,
        thumbnail_path,
        remote_image_path: Some(record.image_path.clone()),
        remote_thumbnail_path: record.thumbnail_path.clone(),
        voice,
        visibility: record.visibility,
        created_at: record.created_at.timestamp_millis(),
        updated_at: incoming_ms,
        sync_state: SyncState::Synced,
    };

    // The guarded upsert re-checks freshness; a local edit may have raced
    // the downloads.
    if !store.apply_remote_item(&item).await? {
        return Ok(Applied::Stale);
    }
    Ok(if existing.is_some() {
        Applied::Updated
    } else {
        Applied::Created
    })
}

async fn apply_collection(store: &LocalStore, record: &CollectionRecord) -> Result<Applied> {
    let existing = store.get_collection(&record.id).await?;
    let incoming_ms = record.updated_at.timestamp_millis();

    if let Some(existing) = &existing {
        if existing.updated_at >= incoming_ms {
            return Ok(Applied::Stale);
        }
    }

    let collection = Collection {
        id: record.id,
        owner_id: Some(record.owner_id.clone()),
        name: record.name.clone(),
        description: record.description.clone(),
        cover_remote_path: record.cover_path.clone(),
        visibility: record.visibility,
        created_at: record.created_at.timestamp_millis(),
        updated_at: incoming_ms,
        sync_state: SyncState::Synced,
    };

    if !store.apply_remote_collection(&collection).await? {
        return Ok(Applied::Stale);
    }
    Ok(if existing.is_some() {
        Applied::Updated
    } else {
        Applied::Created
    })
}

async fn materialize(
    objects: &dyn ObjectStore,
    object_key: &str,
    dir: &std::path::Path,
    file_name: &str,
) -> Result<PathBuf> {
    let bytes = objects.download(object_key).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::testing::{remote_item, MemoryObjectStore};

    async fn setup() -> (LocalStore, MemoryObjectStore, tempfile::TempDir) {
        let tmp = tempdir().unwrap();
        let store = LocalStore::open_in_memory(tmp.path().join("media"))
            .await
            .unwrap();
        (store, MemoryObjectStore::new(), tmp)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn applying_unknown_item_materializes_row_and_blobs() {
        let (store, objects, _tmp) = setup().await;

        let record = remote_item("user-1", "sunset", 10_000);
        objects.seed(&record.image_path, b"jpeg-bytes");

        let applied =
            apply_remote_record(&store, &objects, &RemoteRecord::Item(record.clone()))
                .await
                .unwrap();
        assert_eq!(applied, Applied::Created);

        let item = store.get_item(&record.id).await.unwrap().unwrap();
        assert_eq!(item.caption, "sunset");
        assert_eq!(item.sync_state, SyncState::Synced);
        assert_eq!(std::fs::read(&item.image_path).unwrap(), b"jpeg-bytes");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_record_is_skipped_without_downloads() {
        let (store, objects, _tmp) = setup().await;

        let mut record = remote_item("user-1", "first", 10_000);
        objects.seed(&record.image_path, b"jpeg-bytes");
        apply_remote_record(&store, &objects, &RemoteRecord::Item(record.clone()))
            .await
            .unwrap();

        // Same timestamp: the tie keeps the local row, and the blob store is
        // never consulted again.
        objects.fail_keys_containing("image.jpg");
        record.caption = "rewritten elsewhere".to_string();
        let applied = apply_remote_record(&store, &objects, &RemoteRecord::Item(record.clone()))
            .await
            .unwrap();
        assert_eq!(applied, Applied::Stale);
        assert_eq!(
            store.get_item(&record.id).await.unwrap().unwrap().caption,
            "first"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn newer_record_replaces_local_copy() {
        let (store, objects, _tmp) = setup().await;

        let mut record = remote_item("user-1", "first", 10_000);
        objects.seed(&record.image_path, b"v1");
        apply_remote_record(&store, &objects, &RemoteRecord::Item(record.clone()))
            .await
            .unwrap();

        record.caption = "second".to_string();
        record.updated_at = record.updated_at + chrono::Duration::seconds(5);
        objects.seed(&record.image_path, b"v2");

        let applied = apply_remote_record(&store, &objects, &RemoteRecord::Item(record.clone()))
            .await
            .unwrap();
        assert_eq!(applied, Applied::Updated);

        let item = store.get_item(&record.id).await.unwrap().unwrap();
        assert_eq!(item.caption, "second");
        assert_eq!(std::fs::read(&item.image_path).unwrap(), b"v2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_blob_fails_the_record() {
        let (store, objects, _tmp) = setup().await;

        let record = remote_item("user-1", "no blob", 10_000);
        let err = apply_remote_record(&store, &objects, &RemoteRecord::Item(record.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Storage(_)));
        assert!(store.get_item(&record.id).await.unwrap().is_none());
    }
}
