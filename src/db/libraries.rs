//! Library database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

const LIBRARY_COLUMNS: &str = r#"
    id, name, root_path, enable_filesystem, enable_plex, enable_torrents,
    trash_retention_days, min_seed_time_minutes, min_seed_ratio, min_seeders,
    plex_url, plex_token, plex_section_id, plex_root_path,
    qb_url, qb_username, qb_password, qb_root_path,
    last_scanned_at, created_at, updated_at
"#;

/// Library record from database
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LibraryRecord {
    pub id: Uuid,
    pub name: String,
    pub root_path: String,
    pub enable_filesystem: bool,
    pub enable_plex: bool,
    pub enable_torrents: bool,
    pub trash_retention_days: i64,
    pub min_seed_time_minutes: i64,
    pub min_seed_ratio: f64,
    pub min_seeders: i64,
    pub plex_url: Option<String>,
    #[serde(skip_serializing)]
    pub plex_token: Option<String>,
    pub plex_section_id: Option<String>,
    pub plex_root_path: Option<String>,
    pub qb_url: Option<String>,
    pub qb_username: Option<String>,
    #[serde(skip_serializing)]
    pub qb_password: Option<String>,
    pub qb_root_path: Option<String>,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LibraryRecord {
    /// Torrent attribution runs only with the integration on and a client URL set
    pub fn torrent_sync_enabled(&self) -> bool {
        self.enable_torrents && self.qb_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    /// Media-server refreshes run only with the integration on and a server URL set
    pub fn plex_enabled(&self) -> bool {
        self.enable_plex && self.plex_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

/// Input for creating a library
#[derive(Debug, Clone)]
pub struct CreateLibrary {
    pub name: String,
    pub root_path: String,
    pub enable_filesystem: bool,
    pub enable_plex: bool,
    pub enable_torrents: bool,
    pub trash_retention_days: i64,
    pub min_seed_time_minutes: i64,
    pub min_seed_ratio: f64,
    pub min_seeders: i64,
    pub plex_url: Option<String>,
    pub plex_token: Option<String>,
    pub plex_section_id: Option<String>,
    pub plex_root_path: Option<String>,
    pub qb_url: Option<String>,
    pub qb_username: Option<String>,
    pub qb_password: Option<String>,
    pub qb_root_path: Option<String>,
}

impl CreateLibrary {
    /// A filesystem-only library with default retention and thresholds
    pub fn new(name: impl Into<String>, root_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root_path: root_path.into(),
            enable_filesystem: true,
            enable_plex: false,
            enable_torrents: false,
            trash_retention_days: 30,
            min_seed_time_minutes: 0,
            min_seed_ratio: 0.0,
            min_seeders: 0,
            plex_url: None,
            plex_token: None,
            plex_section_id: None,
            plex_root_path: None,
            qb_url: None,
            qb_username: None,
            qb_password: None,
            qb_root_path: None,
        }
    }
}

/// Input for updating a library
#[derive(Debug, Default)]
pub struct UpdateLibrary {
    pub name: Option<String>,
    pub root_path: Option<String>,
    pub enable_filesystem: Option<bool>,
    pub enable_plex: Option<bool>,
    pub enable_torrents: Option<bool>,
    pub trash_retention_days: Option<i64>,
    pub min_seed_time_minutes: Option<i64>,
    pub min_seed_ratio: Option<f64>,
    pub min_seeders: Option<i64>,
    pub plex_url: Option<String>,
    pub plex_token: Option<String>,
    pub plex_section_id: Option<String>,
    pub plex_root_path: Option<String>,
    pub qb_url: Option<String>,
    pub qb_username: Option<String>,
    pub qb_password: Option<String>,
    pub qb_root_path: Option<String>,
}

pub struct LibraryRepository {
    pool: SqlitePool,
}

impl LibraryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get all libraries ordered by name
    pub async fn list(&self) -> Result<Vec<LibraryRecord>> {
        let sql = format!("SELECT {} FROM libraries ORDER BY name", LIBRARY_COLUMNS);
        let records = sqlx::query_as::<_, LibraryRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Get a library by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<LibraryRecord>> {
        let sql = format!("SELECT {} FROM libraries WHERE id = $1", LIBRARY_COLUMNS);
        let record = sqlx::query_as::<_, LibraryRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Create a new library
    pub async fn create(&self, input: CreateLibrary) -> Result<LibraryRecord> {
        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO libraries (
                id, name, root_path, enable_filesystem, enable_plex, enable_torrents,
                trash_retention_days, min_seed_time_minutes, min_seed_ratio, min_seeders,
                plex_url, plex_token, plex_section_id, plex_root_path,
                qb_url, qb_username, qb_password, qb_root_path,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $19)
            RETURNING {}
            "#,
            LIBRARY_COLUMNS
        );

        let record = sqlx::query_as::<_, LibraryRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.name.trim())
            .bind(input.root_path.trim())
            .bind(input.enable_filesystem)
            .bind(input.enable_plex)
            .bind(input.enable_torrents)
            .bind(input.trash_retention_days)
            .bind(input.min_seed_time_minutes)
            .bind(input.min_seed_ratio)
            .bind(input.min_seeders)
            .bind(&input.plex_url)
            .bind(&input.plex_token)
            .bind(&input.plex_section_id)
            .bind(&input.plex_root_path)
            .bind(&input.qb_url)
            .bind(&input.qb_username)
            .bind(&input.qb_password)
            .bind(&input.qb_root_path)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    /// Update a library, leaving unset fields untouched
    pub async fn update(&self, id: Uuid, input: UpdateLibrary) -> Result<Option<LibraryRecord>> {
        let sql = format!(
            r#"
            UPDATE libraries SET
                name = COALESCE($2, name),
                root_path = COALESCE($3, root_path),
                enable_filesystem = COALESCE($4, enable_filesystem),
                enable_plex = COALESCE($5, enable_plex),
                enable_torrents = COALESCE($6, enable_torrents),
                trash_retention_days = COALESCE($7, trash_retention_days),
                min_seed_time_minutes = COALESCE($8, min_seed_time_minutes),
                min_seed_ratio = COALESCE($9, min_seed_ratio),
                min_seeders = COALESCE($10, min_seeders),
                plex_url = COALESCE($11, plex_url),
                plex_token = COALESCE($12, plex_token),
                plex_section_id = COALESCE($13, plex_section_id),
                plex_root_path = COALESCE($14, plex_root_path),
                qb_url = COALESCE($15, qb_url),
                qb_username = COALESCE($16, qb_username),
                qb_password = COALESCE($17, qb_password),
                qb_root_path = COALESCE($18, qb_root_path),
                updated_at = $19
            WHERE id = $1
            RETURNING {}
            "#,
            LIBRARY_COLUMNS
        );

        let record = sqlx::query_as::<_, LibraryRecord>(&sql)
            .bind(id)
            .bind(input.name.as_deref().map(str::trim))
            .bind(input.root_path.as_deref().map(str::trim))
            .bind(input.enable_filesystem)
            .bind(input.enable_plex)
            .bind(input.enable_torrents)
            .bind(input.trash_retention_days)
            .bind(input.min_seed_time_minutes)
            .bind(input.min_seed_ratio)
            .bind(input.min_seeders)
            .bind(&input.plex_url)
            .bind(&input.plex_token)
            .bind(&input.plex_section_id)
            .bind(&input.plex_root_path)
            .bind(&input.qb_url)
            .bind(&input.qb_username)
            .bind(&input.qb_password)
            .bind(&input.qb_root_path)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Delete a library together with its items and trash entries
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM libraries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Update last_scanned_at timestamp
    pub async fn update_last_scanned(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE libraries SET last_scanned_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
