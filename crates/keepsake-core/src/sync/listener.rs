//! Live change listener: applying server-pushed changes as they happen.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::models::{ChangeEvent, ChangeKind, EntityKind, RemoteRecord};
use crate::remote::{FeedScope, ObjectStore, RecordStore};
use crate::services::LocalStore;

use super::events::{EventBus, SyncEvent};
use super::merge::{apply_remote_record, Applied};

/// Lifecycle of the live feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Subscribed,
}

/// Subscribes to the remote change feeds and merges pushed changes into the
/// local store.
///
/// Three feeds are held at once: owned items, owned collections, and the
/// shared item feed. A change that fails to decode or apply is skipped; the
/// feeds stay up. When any feed drops, the listener goes `Disconnected` and
/// the caller decides when to reconnect.
pub struct ChangeListener {
    store: LocalStore,
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    events: EventBus,
    state: Arc<watch::Sender<ListenerState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeListener {
    pub fn new(
        store: LocalStore,
        records: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        events: EventBus,
    ) -> Self {
        let (state, _receiver) = watch::channel(ListenerState::Disconnected);
        Self {
            store,
            records,
            objects,
            events,
            state: Arc::new(state),
            task: Mutex::new(None),
        }
    }

    /// Observe connection state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Connect the feeds and start applying changes. A listener that is
    /// already running stays as it is.
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        self.state.send_replace(ListenerState::Connecting);
        let connected = self.connect().await;
        let (items, collections, shared) = match connected {
            Ok(feeds) => feeds,
            Err(error) => {
                self.state.send_replace(ListenerState::Disconnected);
                return Err(error);
            }
        };
        self.state.send_replace(ListenerState::Subscribed);

        let store = self.store.clone();
        let objects = self.objects.clone();
        let events = self.events.clone();
        let state = self.state.clone();
        *task = Some(tokio::spawn(run_feed_loop(
            store, objects, events, state, items, collections, shared,
        )));
        Ok(())
    }

    async fn connect(
        &self,
    ) -> Result<(
        tokio::sync::mpsc::Receiver<ChangeEvent>,
        tokio::sync::mpsc::Receiver<ChangeEvent>,
        tokio::sync::mpsc::Receiver<ChangeEvent>,
    )> {
        let owner = self
            .records
            .current_identity()
            .await?
            .ok_or(Error::NotAuthenticated)?;

        let items = self
            .records
            .subscribe(FeedScope::Owned {
                entity: EntityKind::Item,
                owner: owner.clone(),
            })
            .await?;
        let collections = self
            .records
            .subscribe(FeedScope::Owned {
                entity: EntityKind::Collection,
                owner,
            })
            .await?;
        let shared = self
            .records
            .subscribe(FeedScope::Shared {
                entity: EntityKind::Item,
            })
            .await?;
        Ok((items, collections, shared))
    }

    /// Tear down the feed task. Safe to call at any time, repeatedly.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }
        self.state.send_replace(ListenerState::Disconnected);
    }
}

async fn run_feed_loop(
    store: LocalStore,
    objects: Arc<dyn ObjectStore>,
    events: EventBus,
    state: Arc<watch::Sender<ListenerState>>,
    mut items: tokio::sync::mpsc::Receiver<ChangeEvent>,
    mut collections: tokio::sync::mpsc::Receiver<ChangeEvent>,
    mut shared: tokio::sync::mpsc::Receiver<ChangeEvent>,
) {
    loop {
        let event = tokio::select! {
            event = items.recv() => event,
            event = collections.recv() => event,
            event = shared.recv() => event,
        };
        let Some(event) = event else { break };

        if let Err(error) = handle_event(&store, objects.as_ref(), &events, &event).await {
            tracing::warn!("Skipping change event for {}: {error}", event.entity);
        }
    }

    tracing::info!("Change feed closed");
    state.send_replace(ListenerState::Disconnected);
}

async fn handle_event(
    store: &LocalStore,
    objects: &dyn ObjectStore,
    events: &EventBus,
    event: &ChangeEvent,
) -> Result<()> {
    match event.kind {
        ChangeKind::Insert | ChangeKind::Update => {
            let record = RemoteRecord::from_json(event.entity, event.record.clone())?;
            let applied = apply_remote_record(store, objects, &record).await?;
            if applied != Applied::Stale {
                events.emit(SyncEvent::EntityChanged {
                    entity: event.entity,
                    id: record.id(),
                });
            }
        }
        ChangeKind::Delete => {
            let id = event.deleted_id()?;
            if store.remove_entity(event.entity, id).await? {
                events.emit(SyncEvent::EntityRemoved {
                    entity: event.entity,
                    id: id.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::models::{ItemRecord, SyncState};
    use crate::testing::{remote_item, MemoryObjectStore, MemoryRecordStore};

    async fn setup() -> (
        ChangeListener,
        LocalStore,
        Arc<MemoryRecordStore>,
        Arc<MemoryObjectStore>,
        tempfile::TempDir,
    ) {
        let tmp = tempdir().unwrap();
        let store = LocalStore::open_in_memory(tmp.path().join("media"))
            .await
            .unwrap();
        let records = Arc::new(MemoryRecordStore::new(Some("user-1")));
        let objects = Arc::new(MemoryObjectStore::new());
        let listener = ChangeListener::new(
            store.clone(),
            records.clone(),
            objects.clone(),
            EventBus::new(),
        );
        (listener, store, records, objects, tmp)
    }

    fn insert_event(record: &ItemRecord) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Insert,
            entity: EntityKind::Item,
            record: serde_json::to_value(record).unwrap(),
        }
    }

    async fn wait_for_item(store: &LocalStore, id: crate::models::ItemId, present: bool) {
        for _attempt in 0..100 {
            if store.get_item(&id).await.unwrap().is_some() == present {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("item presence never reached {present} within one second");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_event_materializes_the_record() {
        let (listener, store, records, objects, _tmp) = setup().await;
        listener.start().await.unwrap();
        assert_eq!(*listener.state().borrow(), ListenerState::Subscribed);

        let record = remote_item("user-2", "pushed from elsewhere", 10_000);
        objects.seed(&record.image_path, b"jpeg");
        records.push_event(insert_event(&record)).await;

        wait_for_item(&store, record.id, true).await;
        let item = store.get_item(&record.id).await.unwrap().unwrap();
        assert_eq!(item.caption, "pushed from elsewhere");
        listener.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_event_for_unknown_record_inserts_it() {
        let (listener, store, records, objects, _tmp) = setup().await;
        listener.start().await.unwrap();

        let record = remote_item("user-1", "edited elsewhere first", 10_000);
        objects.seed(&record.image_path, b"jpeg");
        records
            .push_event(ChangeEvent {
                kind: ChangeKind::Update,
                entity: EntityKind::Item,
                record: serde_json::to_value(&record).unwrap(),
            })
            .await;

        wait_for_item(&store, record.id, true).await;
        let item = store.get_item(&record.id).await.unwrap().unwrap();
        assert_eq!(item.caption, "edited elsewhere first");
        assert_eq!(item.sync_state, SyncState::Synced);
        listener.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_event_is_skipped_and_the_feed_survives() {
        let (listener, store, records, objects, _tmp) = setup().await;
        listener.start().await.unwrap();

        records
            .push_event(ChangeEvent {
                kind: ChangeKind::Insert,
                entity: EntityKind::Item,
                record: json!({"id": 42}),
            })
            .await;

        let record = remote_item("user-1", "still alive", 10_000);
        objects.seed(&record.image_path, b"jpeg");
        records.push_event(insert_event(&record)).await;

        wait_for_item(&store, record.id, true).await;
        assert_eq!(*listener.state().borrow(), ListenerState::Subscribed);
        listener.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_event_removes_the_row() {
        let (listener, store, records, objects, _tmp) = setup().await;
        listener.start().await.unwrap();

        let record = remote_item("user-1", "short-lived", 10_000);
        objects.seed(&record.image_path, b"jpeg");
        records.push_event(insert_event(&record)).await;
        wait_for_item(&store, record.id, true).await;

        records
            .push_event(ChangeEvent {
                kind: ChangeKind::Delete,
                entity: EntityKind::Item,
                record: json!({"id": record.id.as_str()}),
            })
            .await;
        wait_for_item(&store, record.id, false).await;
        listener.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn feed_drop_flips_state_to_disconnected() {
        let (listener, _store, records, _objects, _tmp) = setup().await;
        listener.start().await.unwrap();

        let mut state = listener.state();
        records.close_feeds();

        state.changed().await.unwrap();
        assert_eq!(*state.borrow(), ListenerState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_without_identity_fails_and_stays_disconnected() {
        let tmp = tempdir().unwrap();
        let store = LocalStore::open_in_memory(tmp.path().join("media"))
            .await
            .unwrap();
        let listener = ChangeListener::new(
            store,
            Arc::new(MemoryRecordStore::new(None)),
            Arc::new(MemoryObjectStore::new()),
            EventBus::new(),
        );

        assert!(matches!(
            listener.start().await.unwrap_err(),
            Error::NotAuthenticated
        ));
        assert_eq!(*listener.state().borrow(), ListenerState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_is_idempotent() {
        let (listener, _store, _records, _objects, _tmp) = setup().await;
        listener.start().await.unwrap();
        listener.stop().await;
        listener.stop().await;
        assert_eq!(*listener.state().borrow(), ListenerState::Disconnected);
    }
}
