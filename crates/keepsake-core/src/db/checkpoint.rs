//! Incremental pull checkpoints

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::EntityKind;

/// Key-value store holding the last successful pull timestamp per entity
/// kind (Unix ms).
///
/// Written only by the pull engine, after a pass completes; the stored value
/// never decreases.
pub struct CheckpointStore<'a> {
    conn: &'a Connection,
}

impl<'a> CheckpointStore<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, entity: EntityKind) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_pulled_at FROM sync_checkpoints WHERE entity = ?1",
                params![entity.table()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Advance the checkpoint; a value older than the stored one is ignored.
    pub async fn advance(&self, entity: EntityKind, last_pulled_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_checkpoints (entity, last_pulled_at) VALUES (?1, ?2) \
                 ON CONFLICT(entity) DO UPDATE SET \
                   last_pulled_at = MAX(last_pulled_at, excluded.last_pulled_at)",
                params![entity.table(), last_pulled_at],
            )
            .await?;
        Ok(())
    }
}
