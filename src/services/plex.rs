//! Plex media server client
//!
//! Only the two calls the reconciler needs: list sections and refresh one.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::db::LibraryRecord;

const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// A library section as reported by `GET /library/sections`
#[derive(Debug, Clone, Deserialize)]
pub struct PlexSection {
    pub key: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "Location")]
    locations: OneOrMany<PlexLocation>,
}

impl PlexSection {
    pub fn locations(&self) -> &[PlexLocation] {
        self.locations.as_slice()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlexLocation {
    #[serde(default)]
    pub path: String,
}

/// Plex returns a bare object where a one-element list is expected
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => std::slice::from_ref(item),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SectionsResponse {
    #[serde(rename = "MediaContainer", default)]
    container: SectionsContainer,
}

#[derive(Debug, Default, Deserialize)]
struct SectionsContainer {
    #[serde(rename = "Directory", default)]
    directories: Vec<PlexSection>,
}

/// Client bound to one library's Plex settings
pub struct PlexClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl PlexClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .with_context(|| format!("Invalid Plex URL: {}", base_url))?;
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Build a client from a library; `None` when Plex is not enabled for it
    pub fn for_library(library: &LibraryRecord) -> Result<Option<Self>> {
        if !library.plex_enabled() {
            return Ok(None);
        }
        let url = library.plex_url.as_deref().unwrap_or_default();
        Self::new(url, library.plex_token.clone()).map(Some)
    }

    fn request(&self, path: &str, timeout: Duration) -> Result<reqwest::RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("Invalid Plex path: {}", path))?;
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout);
        if let Some(token) = &self.token {
            request = request.header("X-Plex-Token", token);
        }
        Ok(request)
    }

    /// List all library sections
    pub async fn sections(&self) -> Result<Vec<PlexSection>> {
        let response = self
            .request("library/sections", LIST_TIMEOUT)?
            .send()
            .await
            .context("Failed to reach Plex")?
            .error_for_status()
            .context("Plex rejected the sections request")?;

        let body: SectionsResponse = response
            .json()
            .await
            .context("Failed to parse Plex sections")?;

        Ok(body.container.directories)
    }

    /// Section key to refresh for a library: the pinned section, else the
    /// section with the longest location prefixing the library's root
    pub async fn resolve_section(&self, library: &LibraryRecord) -> Result<Option<String>> {
        if let Some(section_id) = library.plex_section_id.as_deref().filter(|s| !s.is_empty()) {
            return Ok(Some(section_id.to_string()));
        }
        let root = library
            .plex_root_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&library.root_path);
        let sections = self.sections().await?;
        Ok(best_section_for_root(&sections, root).map(|s| s.key.clone()))
    }

    /// Ask Plex to rescan a section, optionally limited to one path
    pub async fn refresh_section(&self, section_id: &str, path: Option<&str>) -> Result<()> {
        let mut request =
            self.request(&format!("library/sections/{}/refresh", section_id), REFRESH_TIMEOUT)?;
        if let Some(path) = path {
            request = request.query(&[("path", path)]);
        }

        request
            .send()
            .await
            .context("Failed to reach Plex")?
            .error_for_status()
            .context("Plex rejected the refresh request")?;

        Ok(())
    }

    /// Resolve the library's section and refresh it
    pub async fn refresh_library(&self, library: &LibraryRecord) -> Result<bool> {
        let Some(section_id) = self.resolve_section(library).await? else {
            warn!(library_id = %library.id, "No Plex section matches library root");
            return Ok(false);
        };

        self.refresh_section(&section_id, None).await?;
        info!(library_id = %library.id, section = %section_id, "Plex refresh requested");
        Ok(true)
    }
}

/// Pick the section whose location is the longest prefix of `root`
pub fn best_section_for_root<'a>(sections: &'a [PlexSection], root: &str) -> Option<&'a PlexSection> {
    let root = root.trim_end_matches('/');
    let mut best: Option<(&PlexSection, usize)> = None;

    for section in sections {
        for location in section.locations() {
            let path = location.path.trim_end_matches('/');
            if path.is_empty() {
                continue;
            }
            if root.starts_with(path) && best.is_none_or(|(_, len)| path.len() > len) {
                best = Some((section, path.len()));
            }
        }
    }

    best.map(|(section, _)| section)
}
