//! Collection repository

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{Collection, CollectionId, OwnerId, SyncState};

const COLLECTION_COLUMNS: &str = "id, owner_id, name, description, cover_remote_path, \
     visibility, created_at, updated_at, sync_state";

/// libSQL-backed storage for collections.
pub struct CollectionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> CollectionRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, collection: &Collection) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO collections (id, owner_id, name, description, \
                 cover_remote_path, visibility, created_at, updated_at, sync_state) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                collection_params(collection),
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &CollectionId) -> Result<Option<Collection>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?1"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_collection(&row)?)),
            None => Ok(None),
        }
    }

    /// List collections newest-first.
    pub async fn list(&self) -> Result<Vec<Collection>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {COLLECTION_COLUMNS} FROM collections ORDER BY created_at DESC"
                ),
                (),
            )
            .await?;

        let mut collections = Vec::new();
        while let Some(row) = rows.next().await? {
            collections.push(parse_collection(&row)?);
        }
        Ok(collections)
    }

    /// Collections eligible for the next outbox drain, oldest-first.
    pub async fn list_needing_sync(&self) -> Result<Vec<Collection>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {COLLECTION_COLUMNS} FROM collections \
                     WHERE sync_state IN ('pending', 'failed') ORDER BY created_at ASC"
                ),
                (),
            )
            .await?;

        let mut collections = Vec::new();
        while let Some(row) = rows.next().await? {
            collections.push(parse_collection(&row)?);
        }
        Ok(collections)
    }

    pub async fn set_state(&self, id: &CollectionId, state: SyncState) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE collections SET sync_state = ?1 WHERE id = ?2",
                params![state.as_str(), id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Guarded `syncing` to `synced` transition, mirroring the item rule.
    pub async fn mark_synced_if_unchanged(
        &self,
        id: &CollectionId,
        snapshot_updated_at: i64,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE collections SET sync_state = 'synced' \
                 WHERE id = ?1 AND updated_at = ?2 AND sync_state = 'syncing'",
                params![id.as_str(), snapshot_updated_at],
            )
            .await?;
        Ok(rows > 0)
    }

    /// Record the owner after the first successful upsert.
    pub async fn record_owner(&self, id: &CollectionId, owner: &OwnerId) -> Result<()> {
        self.conn
            .execute(
                "UPDATE collections SET owner_id = ?1 WHERE id = ?2",
                params![owner.as_str(), id.as_str()],
            )
            .await?;
        Ok(())
    }

    /// Apply a remote copy under the last-write-wins rule.
    pub async fn apply_remote(&self, collection: &Collection) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "INSERT INTO collections (id, owner_id, name, description, \
                 cover_remote_path, visibility, created_at, updated_at, sync_state) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(id) DO UPDATE SET \
                   owner_id = excluded.owner_id, \
                   name = excluded.name, \
                   description = excluded.description, \
                   cover_remote_path = excluded.cover_remote_path, \
                   visibility = excluded.visibility, \
                   updated_at = excluded.updated_at, \
                   sync_state = excluded.sync_state \
                 WHERE excluded.updated_at > collections.updated_at",
                collection_params(collection),
            )
            .await?;
        Ok(rows > 0)
    }

    /// Delete by string id. Items keep their rows; their `collection_id`
    /// clears via the FK. Returns `false` when absent.
    pub async fn remove_by_id(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM collections WHERE id = ?1", params![id])
            .await?;
        Ok(rows > 0)
    }

    pub async fn reset_interrupted(&self) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE collections SET sync_state = 'failed' WHERE sync_state = 'syncing'",
                (),
            )
            .await?;
        Ok(rows)
    }
}

fn collection_params(collection: &Collection) -> impl libsql::params::IntoParams {
    params![
        collection.id.as_str(),
        collection
            .owner_id
            .as_ref()
            .map(|owner| owner.as_str().to_string()),
        collection.name.clone(),
        collection.description.clone(),
        collection.cover_remote_path.clone(),
        collection.visibility.as_str(),
        collection.created_at,
        collection.updated_at,
        collection.sync_state.as_str()
    ]
}

fn parse_collection(row: &libsql::Row) -> Result<Collection> {
    let id: String = row.get(0)?;
    let visibility: String = row.get(5)?;
    let sync_state: String = row.get(8)?;

    Ok(Collection {
        id: id
            .parse()
            .map_err(|_| Error::Database(format!("Invalid collection id: {id}")))?,
        owner_id: row.get::<Option<String>>(1)?.map(crate::models::OwnerId::from),
        name: row.get(2)?,
        description: row.get(3)?,
        cover_remote_path: row.get(4)?,
        visibility: visibility.parse()?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        sync_state: sync_state.parse()?,
    })
}
