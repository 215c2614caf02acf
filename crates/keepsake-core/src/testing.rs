//! In-memory fakes for the remote interfaces, used across engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::models::{ChangeEvent, EntityKind, OwnerId, RemoteRecord};
use crate::remote::{FeedScope, ObjectStore, RecordStore};

/// [`RecordStore`] fake with failure injection and hand-driven change feeds.
pub(crate) struct MemoryRecordStore {
    identity: Mutex<Option<OwnerId>>,
    records: Mutex<HashMap<(EntityKind, String), RemoteRecord>>,
    upserts: AtomicUsize,
    upsert_delay: Mutex<Option<Duration>>,
    failing_ids: Mutex<HashSet<String>>,
    feeds: Mutex<Vec<(FeedScope, mpsc::Sender<ChangeEvent>)>>,
}

impl MemoryRecordStore {
    pub fn new(identity: Option<&str>) -> Self {
        Self {
            identity: Mutex::new(identity.map(OwnerId::from)),
            records: Mutex::new(HashMap::new()),
            upserts: AtomicUsize::new(0),
            upsert_delay: Mutex::new(None),
            failing_ids: Mutex::new(HashSet::new()),
            feeds: Mutex::new(Vec::new()),
        }
    }

    /// Make upserts and deletes of the given id fail.
    pub fn fail_writes_of(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    /// Hold every upsert for the given duration (for overlap tests).
    pub fn delay_upserts(&self, delay: Duration) {
        *self.upsert_delay.lock().unwrap() = Some(delay);
    }

    /// Seed a record as if another device had upserted it.
    pub fn seed(&self, record: RemoteRecord) {
        self.records
            .lock()
            .unwrap()
            .insert((record.entity(), record.id()), record);
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn record(&self, entity: EntityKind, id: &str) -> Option<RemoteRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(entity, id.to_string()))
            .cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Push an event into every live feed matching the event's entity.
    pub async fn push_event(&self, event: ChangeEvent) {
        let senders: Vec<_> = self
            .feeds
            .lock()
            .unwrap()
            .iter()
            .filter(|(scope, _)| scope.entity() == event.entity)
            .map(|(_, sender)| sender.clone())
            .collect();
        for sender in senders {
            let _ = sender.send(event.clone()).await;
        }
    }

    /// Drop every feed sender, closing subscriber channels.
    pub fn close_feeds(&self) {
        self.feeds.lock().unwrap().clear();
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn current_identity(&self) -> Result<Option<OwnerId>> {
        Ok(self.identity.lock().unwrap().clone())
    }

    async fn upsert(&self, record: RemoteRecord) -> Result<RemoteRecord> {
        let delay = *self.upsert_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.failing_ids.lock().unwrap().contains(&record.id()) {
            return Err(Error::Transport("injected upsert failure".to_string()));
        }

        self.records
            .lock()
            .unwrap()
            .insert((record.entity(), record.id()), record.clone());
        Ok(record)
    }

    async fn changed_since(
        &self,
        entity: EntityKind,
        owner: &OwnerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteRecord>> {
        let mut matches: Vec<RemoteRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.entity() == entity)
            .filter(|record| match record {
                RemoteRecord::Item(item) => &item.owner_id == owner,
                RemoteRecord::Collection(collection) => &collection.owner_id == owner,
            })
            .filter(|record| since.map_or(true, |since| record.updated_at() > since))
            .cloned()
            .collect();

        matches.sort_by_key(RemoteRecord::updated_at);
        Ok(matches)
    }

    async fn delete(&self, entity: EntityKind, id: &str) -> Result<()> {
        if self.failing_ids.lock().unwrap().contains(id) {
            return Err(Error::Transport("injected delete failure".to_string()));
        }
        self.records
            .lock()
            .unwrap()
            .remove(&(entity, id.to_string()));
        Ok(())
    }

    async fn subscribe(&self, scope: FeedScope) -> Result<mpsc::Receiver<ChangeEvent>> {
        let (sender, receiver) = mpsc::channel(16);
        self.feeds.lock().unwrap().push((scope, sender));
        Ok(receiver)
    }
}

/// Build a remote item record the way another device would have uploaded it.
pub(crate) fn remote_item(owner: &str, caption: &str, updated_at_ms: i64) -> crate::models::ItemRecord {
    let id = crate::models::ItemId::new();
    let updated_at = DateTime::from_timestamp_millis(updated_at_ms).unwrap();
    crate::models::ItemRecord {
        id,
        owner_id: OwnerId::from(owner),
        collection_id: None,
        caption: caption.to_string(),
        image_path: format!("users/{owner}/items/{id}/image.jpg"),
        thumbnail_path: None,
        voice_path: None,
        voice_duration_ms: None,
        visibility: crate::models::Visibility::Private,
        created_at: updated_at,
        updated_at,
    }
}

/// Build a remote collection record.
pub(crate) fn remote_collection(
    owner: &str,
    name: &str,
    updated_at_ms: i64,
) -> crate::models::CollectionRecord {
    let updated_at = DateTime::from_timestamp_millis(updated_at_ms).unwrap();
    crate::models::CollectionRecord {
        id: crate::models::CollectionId::new(),
        owner_id: OwnerId::from(owner),
        name: name.to_string(),
        description: None,
        cover_path: None,
        visibility: crate::models::Visibility::Private,
        created_at: updated_at,
        updated_at,
    }
}

/// [`ObjectStore`] fake backed by a map, with per-key failure injection.
pub(crate) struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: AtomicUsize,
    failing_fragment: Mutex<Option<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            uploads: AtomicUsize::new(0),
            failing_fragment: Mutex::new(None),
        }
    }

    /// Make transfers of any key containing the fragment fail.
    pub fn fail_keys_containing(&self, fragment: &str) {
        *self.failing_fragment.lock().unwrap() = Some(fragment.to_string());
    }

    pub fn seed(&self, object_key: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(object_key.to_string(), bytes.to_vec());
    }

    pub fn contains(&self, object_key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(object_key)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    fn check_key(&self, object_key: &str) -> Result<()> {
        let failing = self.failing_fragment.lock().unwrap();
        if failing
            .as_ref()
            .is_some_and(|fragment| object_key.contains(fragment.as_str()))
        {
            return Err(Error::Storage(format!(
                "injected transfer failure for {object_key}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        object_key: &str,
        bytes: &[u8],
        _content_type: Option<&str>,
    ) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.check_key(object_key)?;
        self.objects
            .lock()
            .unwrap()
            .insert(object_key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn download(&self, object_key: &str) -> Result<Vec<u8>> {
        self.check_key(object_key)?;
        self.objects
            .lock()
            .unwrap()
            .get(object_key)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("no such object: {object_key}")))
    }

    async fn delete(&self, object_keys: &[String]) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        for object_key in object_keys {
            objects.remove(object_key);
        }
        Ok(())
    }

    fn public_url(&self, _object_key: &str) -> Option<String> {
        None
    }
}
