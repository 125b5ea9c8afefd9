//! Remote XMLTV listing sources
//!
//! A [`ListingSource`] couples the immutable identity of a feed (its URL) with
//! the mutable download state the fetcher updates. The local cache file name
//! is derived from a SHA-256 of the lowercased URL, so every instance pointed
//! at the same feed shares one cache slot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::errors::{AppError, AppResult};
use crate::utils::url::validate_listing_url;

/// Default directory for downloaded listing files
pub const DEFAULT_LISTING_DIR: &str = ".epg_data";

/// Download lifecycle snapshot for a listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListingState {
    /// A fetch is currently transferring
    pub downloading: bool,
    /// A fetch has completed and the local file is complete
    pub downloaded: bool,
    /// `Last-Modified` reported by the server on the last successful fetch
    pub last_modified: Option<DateTime<Utc>>,
}

/// A configured remote XMLTV feed plus its local cache state
pub struct ListingSource {
    url: Url,
    key: String,
    cache_dir: PathBuf,
    local_path: PathBuf,
    icon_base_url: Option<Url>,
    state: RwLock<ListingState>,
}

impl ListingSource {
    /// Create a listing for `url`, caching downloads under `cache_dir`
    pub fn new(url: &str, cache_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let url = validate_listing_url(url).map_err(AppError::validation)?;
        let cache_dir = cache_dir.into();
        let key = url.as_str().to_lowercase();

        let digest = Sha256::digest(key.as_bytes());
        let local_path = cache_dir.join(format!("{}.xml", hex::encode(digest)));

        let listing = Self {
            url,
            key,
            cache_dir,
            local_path,
            icon_base_url: None,
            state: RwLock::new(ListingState::default()),
        };
        debug!("Listing initialised: {}", listing);
        Ok(listing)
    }

    /// Create a listing using [`DEFAULT_LISTING_DIR`]
    pub fn with_default_dir(url: &str) -> AppResult<Self> {
        Self::new(url, DEFAULT_LISTING_DIR)
    }

    /// Resolve relative icon paths in this feed against `base` instead of the feed URL
    pub fn with_icon_base_url(mut self, base: &str) -> AppResult<Self> {
        let base = validate_listing_url(base).map_err(AppError::validation)?;
        self.icon_base_url = Some(base);
        Ok(self)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Base for relative `<icon src>` values; defaults to the feed URL
    pub fn icon_base_url(&self) -> &Url {
        self.icon_base_url.as_ref().unwrap_or(&self.url)
    }

    /// Case-insensitive identity key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the completed download lives (whether or not it exists yet)
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Staging file used while a transfer is in flight
    pub fn temp_path(&self) -> PathBuf {
        self.local_path.with_extension("tmp")
    }

    pub async fn state(&self) -> ListingState {
        self.state.read().await.clone()
    }

    pub async fn is_downloading(&self) -> bool {
        self.state.read().await.downloading
    }

    pub async fn is_downloaded(&self) -> bool {
        self.state.read().await.downloaded
    }

    pub async fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_modified
    }

    /// Mark a download as started; false if one is already running
    pub(crate) async fn begin_download(&self) -> bool {
        let mut state = self.state.write().await;
        if state.downloading {
            return false;
        }
        state.downloading = true;
        true
    }

    /// Record a completed transfer. `downloaded` only ever moves to true.
    pub(crate) async fn complete_download(&self, last_modified: Option<DateTime<Utc>>) {
        let mut state = self.state.write().await;
        state.downloading = false;
        state.downloaded = true;
        if last_modified.is_some() {
            state.last_modified = last_modified;
        }
    }

    /// Record a failed transfer; the previous download is left untouched
    pub(crate) async fn abort_download(&self) {
        self.state.write().await.downloading = false;
    }
}

impl PartialEq for ListingSource {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ListingSource {}

impl Hash for ListingSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for ListingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Listing: url='{}', path='{}'>",
            self.url,
            self.local_path.display()
        )
    }
}

impl fmt::Debug for ListingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingSource")
            .field("url", &self.url.as_str())
            .field("local_path", &self.local_path)
            .finish()
    }
}
