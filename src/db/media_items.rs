//! Media items database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

const MEDIA_ITEM_COLUMNS: &str = r#"
    id, library_id, name, path, size_bytes, resolution, modified_at,
    last_watched_at, last_scan_at,
    torrent_hash, torrent_ratio, torrent_seed_time, torrent_seeders, torrent_leechers,
    is_in_trash, is_missing, trashed_at, trashed_path, created_at
"#;

/// Media item record from database
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MediaItemRecord {
    pub id: Uuid,
    pub library_id: Uuid,
    pub name: String,
    pub path: String,
    pub size_bytes: i64,
    pub resolution: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub last_watched_at: Option<DateTime<Utc>>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub torrent_hash: Option<String>,
    pub torrent_ratio: Option<f64>,
    pub torrent_seed_time: Option<i64>,
    pub torrent_seeders: Option<i64>,
    pub torrent_leechers: Option<i64>,
    pub is_in_trash: bool,
    pub is_missing: bool,
    pub trashed_at: Option<DateTime<Utc>>,
    pub trashed_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MediaItemRecord {
    /// Current torrent attribution fields
    pub fn attribution(&self) -> TorrentAttribution {
        TorrentAttribution {
            hash: self.torrent_hash.clone(),
            ratio: self.torrent_ratio,
            seed_time_secs: self.torrent_seed_time,
            seeders: self.torrent_seeders,
            leechers: self.torrent_leechers,
        }
    }
}

/// The five torrent attribution columns, written and cleared together
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TorrentAttribution {
    pub hash: Option<String>,
    pub ratio: Option<f64>,
    pub seed_time_secs: Option<i64>,
    pub seeders: Option<i64>,
    pub leechers: Option<i64>,
}

/// Input for creating a media item
#[derive(Debug, Clone)]
pub struct CreateMediaItem {
    pub library_id: Uuid,
    pub name: String,
    pub path: String,
    pub size_bytes: i64,
    pub modified_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

/// On-disk state observed for a known item during a scan
#[derive(Debug, Clone, Copy)]
pub struct ScanObservation {
    pub size_bytes: i64,
    pub modified_at: Option<DateTime<Utc>>,
    pub scanned_at: DateTime<Utc>,
}

/// Flag filters for listing items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaItemFilter {
    pub is_missing: Option<bool>,
    pub is_in_trash: Option<bool>,
}

/// Sort order for listing items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaItemOrder {
    #[default]
    Path,
    Name,
    SizeDesc,
    ModifiedDesc,
    LastWatchedAsc,
}

impl MediaItemOrder {
    fn as_sql(self) -> &'static str {
        match self {
            MediaItemOrder::Path => "path ASC",
            MediaItemOrder::Name => "name COLLATE NOCASE ASC, path ASC",
            MediaItemOrder::SizeDesc => "size_bytes DESC, path ASC",
            MediaItemOrder::ModifiedDesc => "modified_at DESC, path ASC",
            MediaItemOrder::LastWatchedAsc => "last_watched_at IS NOT NULL, last_watched_at ASC, path ASC",
        }
    }
}

pub struct MediaItemRepository {
    pool: SqlitePool,
}

impl MediaItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get all media items for a library, trashed ones included
    pub async fn list_by_library(&self, library_id: Uuid) -> Result<Vec<MediaItemRecord>> {
        let sql = format!(
            "SELECT {} FROM media_items WHERE library_id = $1 ORDER BY path",
            MEDIA_ITEM_COLUMNS
        );
        let records = sqlx::query_as::<_, MediaItemRecord>(&sql)
            .bind(library_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Get the items of a library that are not in the trash
    pub async fn list_live_by_library(&self, library_id: Uuid) -> Result<Vec<MediaItemRecord>> {
        let sql = format!(
            "SELECT {} FROM media_items WHERE library_id = $1 AND is_in_trash = 0 ORDER BY path",
            MEDIA_ITEM_COLUMNS
        );
        let records = sqlx::query_as::<_, MediaItemRecord>(&sql)
            .bind(library_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// List one page of a library's items
    pub async fn list_page(
        &self,
        library_id: Uuid,
        filter: MediaItemFilter,
        order: MediaItemOrder,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MediaItemRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM media_items
            WHERE library_id = $1
              AND ($2 IS NULL OR is_missing = $2)
              AND ($3 IS NULL OR is_in_trash = $3)
            ORDER BY {}
            LIMIT $4 OFFSET $5
            "#,
            MEDIA_ITEM_COLUMNS,
            order.as_sql()
        );
        let records = sqlx::query_as::<_, MediaItemRecord>(&sql)
            .bind(library_id)
            .bind(filter.is_missing)
            .bind(filter.is_in_trash)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Count a library's items matching the filter
    pub async fn count(&self, library_id: Uuid, filter: MediaItemFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM media_items
            WHERE library_id = $1
              AND ($2 IS NULL OR is_missing = $2)
              AND ($3 IS NULL OR is_in_trash = $3)
            "#,
        )
        .bind(library_id)
        .bind(filter.is_missing)
        .bind(filter.is_in_trash)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Get a media item by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<MediaItemRecord>> {
        let sql = format!("SELECT {} FROM media_items WHERE id = $1", MEDIA_ITEM_COLUMNS);
        let record = sqlx::query_as::<_, MediaItemRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Find the non-trashed item holding a path in a library
    pub async fn find_live_by_path(&self, library_id: Uuid, path: &str) -> Result<Option<MediaItemRecord>> {
        let sql = format!(
            "SELECT {} FROM media_items WHERE library_id = $1 AND path = $2 AND is_in_trash = 0",
            MEDIA_ITEM_COLUMNS
        );
        let record = sqlx::query_as::<_, MediaItemRecord>(&sql)
            .bind(library_id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Create a new media item
    pub async fn create(&self, input: CreateMediaItem) -> Result<MediaItemRecord> {
        let sql = format!(
            r#"
            INSERT INTO media_items (
                id, library_id, name, path, size_bytes, modified_at, resolution,
                last_scan_at, is_missing, is_in_trash, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 0, $8)
            RETURNING {}
            "#,
            MEDIA_ITEM_COLUMNS
        );

        let record = sqlx::query_as::<_, MediaItemRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.library_id)
            .bind(&input.name)
            .bind(&input.path)
            .bind(input.size_bytes)
            .bind(input.modified_at)
            .bind(&input.resolution)
            .bind(input.scanned_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    /// Record a scan sighting: refresh size and mtime, clear the missing flag
    pub async fn record_scan(&self, id: Uuid, observed: ScanObservation) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE media_items SET
                size_bytes = $2,
                modified_at = $3,
                is_missing = 0,
                last_scan_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(observed.size_bytes)
        .bind(observed.modified_at)
        .bind(observed.scanned_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Flag an item whose backing file was not seen; trashed items are never flagged
    pub async fn mark_missing(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE media_items SET is_missing = 1 WHERE id = $1 AND is_in_trash = 0 AND is_missing = 0",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the torrent attribution columns
    pub async fn update_attribution(&self, id: Uuid, attribution: &TorrentAttribution) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE media_items SET
                torrent_hash = $2,
                torrent_ratio = $3,
                torrent_seed_time = $4,
                torrent_seeders = $5,
                torrent_leechers = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&attribution.hash)
        .bind(attribution.ratio)
        .bind(attribution.seed_time_secs)
        .bind(attribution.seeders)
        .bind(attribution.leechers)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete the library's missing, non-trashed items. Returns the number removed.
    pub async fn clear_missing(&self, library_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM media_items WHERE library_id = $1 AND is_missing = 1 AND is_in_trash = 0",
        )
        .bind(library_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
