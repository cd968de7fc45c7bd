//! qBittorrent WebUI client
//!
//! Covers the calls torrent attribution needs: login, list torrents, list a
//! torrent's files and delete a torrent. The session cookie is kept in the
//! client's cookie store after login.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::db::LibraryRecord;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(15);
const FILES_TIMEOUT: Duration = Duration::from_secs(10);
const DELETE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum QbittorrentError {
    #[error("qBittorrent credentials not configured")]
    NotConfigured,

    #[error("qBittorrent login failed: {0}")]
    Auth(String),

    #[error("qBittorrent API error ({status_code}): {message}")]
    Api { status_code: u16, message: String },

    #[error("qBittorrent request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type QbResult<T> = std::result::Result<T, QbittorrentError>;

/// Torrent as reported by `/api/v2/torrents/info`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TorrentInfo {
    pub hash: String,
    pub name: String,
    pub save_path: Option<String>,
    pub content_path: Option<String>,
    pub ratio: Option<f64>,
    /// Seconds spent seeding
    pub seeding_time: Option<i64>,
    pub num_seeds: Option<i64>,
    pub num_leechs: Option<i64>,
}

/// One file of a torrent as reported by `/api/v2/torrents/files`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TorrentFileEntry {
    pub name: String,
    pub size: Option<u64>,
}

/// An authenticated session against one qBittorrent instance
pub struct QbittorrentClient {
    client: Client,
    base_url: String,
}

impl QbittorrentClient {
    /// Log in and return a client holding the session cookie
    pub async fn login(base_url: &str, username: &str, password: &str) -> QbResult<Self> {
        let client = Client::builder().cookie_store(true).build()?;
        let this = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        };

        let params = [("username", username), ("password", password)];
        let response = this
            .client
            .post(this.url("/auth/login"))
            .form(&params)
            .timeout(LOGIN_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 200 && body.trim() == "Ok." {
            debug!(url = %this.base_url, "Logged in to qBittorrent");
            Ok(this)
        } else if body.trim() == "Fails." {
            Err(QbittorrentError::Auth("invalid username or password".into()))
        } else {
            Err(QbittorrentError::Auth(format!("{} - {}", status.as_u16(), body.trim())))
        }
    }

    /// Log in with a library's settings
    pub async fn for_library(library: &LibraryRecord) -> QbResult<Self> {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.trim().is_empty()).map(str::to_string);
        match (
            non_empty(&library.qb_url),
            non_empty(&library.qb_username),
            non_empty(&library.qb_password),
        ) {
            (Some(url), Some(username), Some(password)) => {
                Self::login(&url, &username, &password).await
            }
            _ => Err(QbittorrentError::NotConfigured),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2{}", self.base_url, path)
    }

    async fn check(response: Response) -> QbResult<Response> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(QbittorrentError::Api {
                status_code: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// List every torrent
    pub async fn torrents(&self) -> QbResult<Vec<TorrentInfo>> {
        let response = self
            .client
            .get(self.url("/torrents/info"))
            .timeout(LIST_TIMEOUT)
            .send()
            .await?;

        Ok(Self::check(response).await?.json::<Vec<TorrentInfo>>().await?)
    }

    /// List a torrent's files; nameless entries are dropped
    pub async fn torrent_files(&self, hash: &str) -> QbResult<Vec<TorrentFileEntry>> {
        let response = self
            .client
            .get(self.url("/torrents/files"))
            .query(&[("hash", hash)])
            .timeout(FILES_TIMEOUT)
            .send()
            .await?;

        let files = Self::check(response).await?.json::<Vec<TorrentFileEntry>>().await?;
        Ok(files.into_iter().filter(|f| !f.name.is_empty()).collect())
    }

    /// Remove a torrent, optionally with its downloaded data
    pub async fn delete_torrent(&self, hash: &str, delete_files: bool) -> QbResult<()> {
        let delete_files = if delete_files { "true" } else { "false" };
        let response = self
            .client
            .post(self.url("/torrents/delete"))
            .form(&[("hashes", hash), ("deleteFiles", delete_files)])
            .timeout(DELETE_TIMEOUT)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torrent_info_tolerates_missing_fields() {
        let torrents: Vec<TorrentInfo> = serde_json::from_str(
            r#"[
                {"hash":"H1","name":"Show","save_path":"/data/show","content_path":"/data/show/e1.mkv",
                 "ratio":1.5,"seeding_time":3600,"num_seeds":4,"num_leechs":1,"state":"uploading"},
                {"hash":"H2"}
            ]"#,
        )
        .unwrap();

        assert_eq!(torrents[0].ratio, Some(1.5));
        assert_eq!(torrents[0].seeding_time, Some(3600));
        assert_eq!(torrents[1].save_path, None);
        assert_eq!(torrents[1].num_seeds, None);
    }

    #[test]
    fn test_file_entry_parses() {
        let files: Vec<TorrentFileEntry> =
            serde_json::from_str(r#"[{"name":"e1.mkv","size":1000,"progress":1.0},{"size":5}]"#).unwrap();
        assert_eq!(files[0], TorrentFileEntry { name: "e1.mkv".into(), size: Some(1000) });
        assert_eq!(files[1].name, "");
    }

    #[tokio::test]
    async fn test_for_library_requires_credentials() {
        let db = crate::db::Database::connect_in_memory().await.unwrap();
        let mut input = crate::db::CreateLibrary::new("Shows", "/lib");
        input.enable_torrents = true;
        input.qb_url = Some("http://127.0.0.1:1".into());
        input.qb_username = Some("admin".into());
        let library = db.libraries().create(input).await.unwrap();

        let result = QbittorrentClient::for_library(&library).await;
        assert!(matches!(result, Err(QbittorrentError::NotConfigured)));
    }
}
