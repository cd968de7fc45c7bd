//! Trash entries database repository
//!
//! A trash entry exists exactly while its media item sits in the trash, so the
//! item flags and the entry row are always written in one transaction.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

const TRASH_ENTRY_COLUMNS: &str =
    "id, library_id, media_item_id, original_path, trashed_path, trashed_at, purge_after";

/// Trash entry record from database
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TrashEntryRecord {
    pub id: Uuid,
    pub library_id: Uuid,
    pub media_item_id: Uuid,
    pub original_path: String,
    pub trashed_path: String,
    pub trashed_at: DateTime<Utc>,
    pub purge_after: DateTime<Utc>,
}

/// Input for recording a move to trash
#[derive(Debug, Clone)]
pub struct CreateTrashEntry {
    pub library_id: Uuid,
    pub media_item_id: Uuid,
    pub original_path: String,
    pub trashed_path: String,
    pub trashed_at: DateTime<Utc>,
    pub purge_after: DateTime<Utc>,
}

pub struct TrashEntryRepository {
    pool: SqlitePool,
}

impl TrashEntryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a trash entry by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<TrashEntryRecord>> {
        let sql = format!("SELECT {} FROM trash_entries WHERE id = $1", TRASH_ENTRY_COLUMNS);
        let record = sqlx::query_as::<_, TrashEntryRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// List a library's trash, most recently trashed first
    pub async fn list_by_library(&self, library_id: Uuid) -> Result<Vec<TrashEntryRecord>> {
        let sql = format!(
            "SELECT {} FROM trash_entries WHERE library_id = $1 ORDER BY trashed_at DESC",
            TRASH_ENTRY_COLUMNS
        );
        let records = sqlx::query_as::<_, TrashEntryRecord>(&sql)
            .bind(library_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// List entries whose purge deadline has passed
    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<TrashEntryRecord>> {
        let sql = format!(
            "SELECT {} FROM trash_entries WHERE purge_after <= $1 ORDER BY purge_after",
            TRASH_ENTRY_COLUMNS
        );
        let records = sqlx::query_as::<_, TrashEntryRecord>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Flag the item as trashed and insert its entry
    pub async fn record_trashed(&self, input: CreateTrashEntry) -> Result<TrashEntryRecord> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE media_items SET
                is_in_trash = 1,
                is_missing = 0,
                trashed_at = $2,
                trashed_path = $3
            WHERE id = $1
            "#,
        )
        .bind(input.media_item_id)
        .bind(input.trashed_at)
        .bind(&input.trashed_path)
        .execute(&mut *tx)
        .await?;

        let sql = format!(
            r#"
            INSERT INTO trash_entries (
                id, library_id, media_item_id, original_path, trashed_path, trashed_at, purge_after
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            TRASH_ENTRY_COLUMNS
        );
        let record = sqlx::query_as::<_, TrashEntryRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.library_id)
            .bind(input.media_item_id)
            .bind(&input.original_path)
            .bind(&input.trashed_path)
            .bind(input.trashed_at)
            .bind(input.purge_after)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Return the item to `restored_path`, clear its trash flags and drop the entry
    pub async fn record_restored(&self, entry: &TrashEntryRecord, restored_path: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE media_items SET
                is_in_trash = 0,
                is_missing = 0,
                trashed_at = NULL,
                trashed_path = NULL,
                path = $2
            WHERE id = $1
            "#,
        )
        .bind(entry.media_item_id)
        .bind(restored_path)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM trash_entries WHERE id = $1")
            .bind(entry.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete an entry
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM trash_entries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
