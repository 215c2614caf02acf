//! Outcome summaries returned by the sync engines.

use crate::models::EntityKind;

/// One contained per-record failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub entity: EntityKind,
    pub id: String,
    pub message: String,
}

/// Result of a single outbox drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records picked up by this pass.
    pub attempted: usize,
    /// Records uploaded and confirmed `synced`.
    pub synced: usize,
    /// Records uploaded but edited mid-flight, left queued for the next pass.
    pub requeued: usize,
    /// Records marked `failed` this pass.
    pub failures: Vec<SyncFailure>,
    /// Set when the pass bailed because another drain was in flight.
    pub already_running: bool,
}

impl SyncReport {
    #[must_use]
    pub(crate) fn already_running() -> Self {
        Self {
            already_running: true,
            ..Self::default()
        }
    }

    /// True when everything attempted ended up `synced`.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.already_running && self.failures.is_empty() && self.requeued == 0
    }
}

/// Result of a single pull pass over one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Records the remote store returned.
    pub fetched: usize,
    /// Records materialized locally for the first time.
    pub created: usize,
    /// Records that replaced an older local copy.
    pub updated: usize,
    /// Records discarded because the local copy was at least as new.
    pub skipped_stale: usize,
    /// Records that failed to apply.
    pub failures: Vec<SyncFailure>,
    /// Checkpoint (Unix ms) after this pass, if one is recorded.
    pub checkpoint: Option<i64>,
}

impl PullReport {
    /// Records written locally by this pass.
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.created + self.updated
    }

    /// Merge a per-entity report into a whole-pass summary.
    pub(crate) fn absorb(&mut self, other: Self) {
        self.fetched += other.fetched;
        self.created += other.created;
        self.updated += other.updated;
        self.skipped_stale += other.skipped_stale;
        self.failures.extend(other.failures);
    }
}
