//! Incremental pull: reconciling remote records into the local store.

use std::sync::Arc;

use chrono::DateTime;

use crate::error::{Error, Result};
use crate::models::EntityKind;
use crate::remote::{ObjectStore, RecordStore};
use crate::services::LocalStore;

use super::events::{EventBus, SyncEvent};
use super::merge::{apply_remote_record, Applied};
use super::report::{PullReport, SyncFailure};

/// Fetches records changed since the last checkpoint and merges them under
/// last-write-wins.
///
/// The checkpoint only ever advances past records that were applied (or
/// correctly skipped): after a partial failure it stops strictly below the
/// earliest failed record, so the next pass re-fetches it.
pub struct PullEngine {
    store: LocalStore,
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    events: EventBus,
}

impl PullEngine {
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
        }
    }

    /// Pull both entity kinds, collections first.
    pub async fn pull_all(&self) -> Result<PullReport> {
        let mut report = self.pull(EntityKind::Collection).await?;
        let items = self.pull(EntityKind::Item).await?;
        let checkpoint = items.checkpoint;
        report.absorb(items);
        report.checkpoint = checkpoint;
        Ok(report)
    }

    /// Pull one entity kind.
    pub async fn pull(&self, entity: EntityKind) -> Result<PullReport> {
        let owner = self
            .records
            .current_identity()
            .await?
            .ok_or(Error::NotAuthenticated)?;

        let since = self
            .store
            .checkpoint(entity)
            .await?
            .and_then(DateTime::from_timestamp_millis);

        let mut fetched = self.records.changed_since(entity, &owner, since).await?;
        fetched.sort_by_key(crate::models::RemoteRecord::updated_at);

        let mut report = PullReport {
            fetched: fetched.len(),
            ..PullReport::default()
        };
        let mut applied_timestamps = Vec::new();
        let mut earliest_failure: Option<i64> = None;

        for record in &fetched {
            let timestamp = record.updated_at_ms();
            match apply_remote_record(&self.store, self.objects.as_ref(), record).await {
                Ok(applied) => {
                    applied_timestamps.push(timestamp);
                    match applied {
                        Applied::Created => report.created += 1,
                        Applied::Updated => report.updated += 1,
                        Applied::Stale => report.skipped_stale += 1,
                    }
                    if applied != Applied::Stale {
                        self.events.emit(SyncEvent::EntityChanged {
                            entity,
                            id: record.id(),
                        });
                    }
                }
                Err(error) => {
                    tracing::warn!("Pull failed for {entity} {}: {error}", record.id());
                    earliest_failure =
                        Some(earliest_failure.map_or(timestamp, |current| current.min(timestamp)));
                    report.failures.push(SyncFailure {
                        entity,
                        id: record.id(),
                        message: error.to_string(),
                    });
                }
            }
        }

        // Advance to the newest processed record that sits strictly below the
        // earliest failure, so failed records stay inside the next window.
        let candidate = match earliest_failure {
            None => applied_timestamps.iter().max().copied(),
            Some(earliest) => applied_timestamps
                .iter()
                .filter(|&&timestamp| timestamp < earliest)
                .max()
                .copied(),
        };
        if let Some(timestamp) = candidate {
            self.store.advance_checkpoint(entity, timestamp).await?;
        }
        report.checkpoint = self.store.checkpoint(entity).await?;

        tracing::info!(
            entity = %entity,
            fetched = report.fetched,
            applied = report.applied(),
            stale = report.skipped_stale,
            failed = report.failures.len(),
            "Pull pass finished"
        );
        self.events.emit(SyncEvent::PullCompleted {
            applied: report.applied(),
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::models::RemoteRecord;
    use crate::testing::{remote_collection, remote_item, MemoryObjectStore, MemoryRecordStore};

    async fn setup() -> (
        PullEngine,
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
        let engine = PullEngine::new(
            store.clone(),
            records.clone(),
            objects.clone(),
            EventBus::new(),
        );
        (engine, store, records, objects, tmp)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_pull_materializes_everything_and_checkpoints() {
        let (engine, store, records, objects, _tmp) = setup().await;

        for (caption, timestamp) in [("first", 1_000), ("second", 2_000)] {
            let record = remote_item("user-1", caption, timestamp);
            objects.seed(&record.image_path, b"jpeg");
            records.seed(RemoteRecord::Item(record));
        }

        let report = engine.pull(EntityKind::Item).await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.created, 2);
        assert_eq!(report.checkpoint, Some(2_000));
        assert_eq!(store.list_items(10, 0).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn incremental_pull_only_fetches_past_the_checkpoint() {
        let (engine, _store, records, objects, _tmp) = setup().await;

        let old = remote_item("user-1", "old", 1_000);
        objects.seed(&old.image_path, b"jpeg");
        records.seed(RemoteRecord::Item(old));
        engine.pull(EntityKind::Item).await.unwrap();

        let new = remote_item("user-1", "new", 5_000);
        objects.seed(&new.image_path, b"jpeg");
        records.seed(RemoteRecord::Item(new));

        let report = engine.pull(EntityKind::Item).await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.checkpoint, Some(5_000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_holds_the_checkpoint_below_the_failed_record() {
        let (engine, store, records, objects, _tmp) = setup().await;

        let good = remote_item("user-1", "good", 1_000);
        let broken = remote_item("user-1", "broken", 2_000);
        let later = remote_item("user-1", "later", 3_000);
        objects.seed(&good.image_path, b"jpeg");
        objects.seed(&later.image_path, b"jpeg");
        // `broken` has no blob, so applying it fails.
        records.seed(RemoteRecord::Item(good));
        records.seed(RemoteRecord::Item(broken.clone()));
        records.seed(RemoteRecord::Item(later));

        let report = engine.pull(EntityKind::Item).await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.checkpoint, Some(1_000));

        // Once the blob shows up the next pass recovers it.
        objects.seed(&broken.image_path, b"jpeg");
        let report = engine.pull(EntityKind::Item).await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped_stale, 1);
        assert_eq!(report.checkpoint, Some(3_000));
        assert!(store.get_item(&broken.id).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_all_covers_collections_and_items() {
        let (engine, store, records, objects, _tmp) = setup().await;

        records.seed(RemoteRecord::Collection(remote_collection(
            "user-1", "Trips", 1_500,
        )));
        let item = remote_item("user-1", "beach", 2_500);
        objects.seed(&item.image_path, b"jpeg");
        records.seed(RemoteRecord::Item(item));

        let report = engine.pull_all().await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.checkpoint, Some(2_500));
        assert_eq!(store.list_collections().await.unwrap().len(), 1);
        assert_eq!(
            store.checkpoint(EntityKind::Collection).await.unwrap(),
            Some(1_500)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_without_identity_is_a_hard_error() {
        let tmp = tempdir().unwrap();
        let store = LocalStore::open_in_memory(tmp.path().join("media"))
            .await
            .unwrap();
        let engine = PullEngine::new(
            store,
            Arc::new(MemoryRecordStore::new(None)),
            Arc::new(MemoryObjectStore::new()),
            EventBus::new(),
        );

        assert!(matches!(
            engine.pull(EntityKind::Item).await.unwrap_err(),
            Error::NotAuthenticated
        ));
    }
}
