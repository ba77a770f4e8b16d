//! Cache storage persisted to a directory.
//!
//! Layout:
//!
//! ```text
//! <root>/index.toml                 cache names in creation order
//! <root>/<sha256(name)>/<sha256(key)>.json   one file per entry
//! ```
//!
//! Every file is written to a uniquely named temp file and renamed into
//! place, so readers never observe a partial entry and concurrent writers of
//! the same key resolve as last-write-wins.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::{CacheEntry, CacheStorage};
use crate::error::{Error, Result};
use crate::fetch::{CacheKey, ResponseSnapshot};

const INDEX_FILE: &str = "index.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    #[serde(default)]
    caches: Vec<IndexedCache>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedCache {
    name: String,
    dir: String,
    created: DateTime<Utc>,
}

/// On-disk form of a [`CacheEntry`].
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    method: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    /// Base64 encoded body.
    body: String,
    stored_at: DateTime<Utc>,
}

fn invalid_data<E>(error: E) -> Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, error))
}

impl StoredEntry {
    fn from_entry(entry: &CacheEntry) -> Self {
        let headers = entry
            .response
            .headers
            .iter()
            .filter_map(|(name, value)| match value.to_str() {
                Ok(value) => Some((name.as_str().to_string(), value.to_string())),
                Err(_) => {
                    log::debug!("Dropping non-text header {name} for {}", entry.key);
                    None
                }
            })
            .collect();

        Self {
            method: entry.key.method.to_string(),
            url: entry.key.url.to_string(),
            status: entry.response.status.as_u16(),
            headers,
            body: BASE64.encode(&entry.response.body),
            stored_at: entry.stored_at,
        }
    }

    fn into_entry(self) -> Result<CacheEntry> {
        let method = Method::from_bytes(self.method.as_bytes()).map_err(invalid_data)?;
        let url = Url::parse(&self.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.url)))?;
        let status = StatusCode::from_u16(self.status).map_err(invalid_data)?;
        let body = BASE64.decode(self.body.as_bytes()).map_err(invalid_data)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }

        Ok(CacheEntry {
            key: CacheKey { method, url },
            response: ResponseSnapshot {
                status,
                headers,
                body: body.into(),
            },
            stored_at: self.stored_at,
        })
    }
}

fn digest_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Writes `contents` to a unique temp file next to `path` and renames it into place.
async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp_path, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

/// Cache storage persisted under a root directory.
#[derive(Debug)]
pub struct DiskStorage {
    root: PathBuf,
    // Serializes writers; readers go straight to the files.
    write_lock: Mutex<()>,
}

impl DiskStorage {
    /// Opens (creating if needed) a storage rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open_dir(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, cache: &str) -> PathBuf {
        self.root.join(digest_hex(cache))
    }

    fn entry_path(&self, cache: &str, key: &CacheKey) -> PathBuf {
        self.cache_dir(cache)
            .join(format!("{}.json", digest_hex(&key.to_string())))
    }

    async fn load_index(&self) -> Result<Index> {
        match tokio::fs::read_to_string(self.root.join(INDEX_FILE)).await {
            Ok(text) => toml::from_str(&text).map_err(invalid_data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Index::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_index(&self, index: &Index) -> Result<()> {
        let text = toml::to_string(index).map_err(invalid_data)?;
        write_atomic(&self.root.join(INDEX_FILE), text.as_bytes()).await?;
        Ok(())
    }

    /// Registers the cache in the index and creates its directory.
    /// Caller must hold the write lock.
    async fn ensure_cache(&self, cache: &str) -> Result<()> {
        let mut index = self.load_index().await?;
        let dir = self.cache_dir(cache);
        if !index.caches.iter().any(|c| c.name == cache) {
            index.caches.push(IndexedCache {
                name: cache.to_string(),
                dir: digest_hex(cache),
                created: Utc::now(),
            });
            tokio::fs::create_dir_all(&dir).await?;
            self.save_index(&index).await?;
        } else if !tokio::fs::try_exists(&dir).await? {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    async fn read_entry(path: &Path) -> Result<Option<CacheEntry>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let stored: StoredEntry = serde_json::from_slice(&bytes)?;
                stored.into_entry().map(Some)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn cache_names(&self) -> Result<Vec<String>> {
        Ok(self
            .load_index()
            .await?
            .caches
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn open(&self, cache: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_cache(cache).await
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut index = self.load_index().await?;
        let before = index.caches.len();
        index.caches.retain(|c| c.name != cache);
        if index.caches.len() == before {
            return Ok(false);
        }

        // Entries go before the index entry; a failed removal leaves the cache listed.
        match tokio::fs::remove_dir_all(self.cache_dir(cache)).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.save_index(&index).await?;
        Ok(true)
    }

    async fn get(&self, cache: &str, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let entry = Self::read_entry(&self.entry_path(cache, key)).await?;
        // Guards against a digest collision returning another key's entry.
        Ok(entry.filter(|e| e.key == *key))
    }

    async fn put(&self, cache: &str, key: CacheKey, response: ResponseSnapshot) -> Result<()> {
        let path = self.entry_path(cache, &key);
        let stored = StoredEntry::from_entry(&CacheEntry::new(key, response));
        let bytes = serde_json::to_vec(&stored)?;

        let _guard = self.write_lock.lock().await;
        self.ensure_cache(cache).await?;
        write_atomic(&path, &bytes).await?;
        Ok(())
    }

    async fn remove(&self, cache: &str, key: &CacheKey) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.entry_path(cache, key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, cache: &str) -> Result<Vec<CacheKey>> {
        let mut dir = match tokio::fs::read_dir(self.cache_dir(cache)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some(entry)) => keys.push(entry.key),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping unreadable cache entry {}: {e}", path.display()),
            }
        }
        Ok(keys)
    }
}
