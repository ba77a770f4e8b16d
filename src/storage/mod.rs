//! Named cache storage.
//!
//! A storage holds any number of named caches, each mapping a [`CacheKey`] to
//! a stored response. Caches are created lazily by [`CacheStorage::open`] or
//! the first [`CacheStorage::put`], and keep their creation order so
//! [`CacheStorage::match_any`] searches the oldest cache first.
//!
//! Two backends are provided:
//! - [`MemoryStorage`] keeps everything in process memory
//! - [`DiskStorage`] persists each entry as a file, surviving restarts

mod disk;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::fetch::{CacheKey, ResponseSnapshot};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// A stored request/response pair. Replaced wholesale on re-caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Request identity.
    pub key: CacheKey,
    /// Response captured when the entry was stored.
    pub response: ResponseSnapshot,
    /// When the entry was stored.
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(key: CacheKey, response: ResponseSnapshot) -> Self {
        Self {
            key,
            response,
            stored_at: Utc::now(),
        }
    }
}

/// Abstraction over a set of named caches.
///
/// Implementations must tolerate concurrent use; concurrent writes to the same
/// key resolve as last-write-wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Returns cache names in creation order.
    async fn cache_names(&self) -> Result<Vec<String>>;

    /// Creates the named cache if it does not exist.
    async fn open(&self, cache: &str) -> Result<()>;

    /// Deletes a whole cache. Returns false if it did not exist.
    async fn delete_cache(&self, cache: &str) -> Result<bool>;

    /// Looks up an entry in one cache.
    async fn get(&self, cache: &str, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Stores a response, creating the cache if needed and replacing any
    /// previous entry for the key.
    async fn put(&self, cache: &str, key: CacheKey, response: ResponseSnapshot) -> Result<()>;

    /// Removes one entry. Returns false if it did not exist.
    async fn remove(&self, cache: &str, key: &CacheKey) -> Result<bool>;

    /// Returns every key stored in one cache. A missing cache has no keys.
    async fn keys(&self, cache: &str) -> Result<Vec<CacheKey>>;

    /// Returns true if the named cache exists.
    async fn has_cache(&self, cache: &str) -> Result<bool> {
        Ok(self.cache_names().await?.iter().any(|name| name == cache))
    }

    /// Looks up a key across every cache, oldest cache first.
    async fn match_any(&self, key: &CacheKey) -> Result<Option<ResponseSnapshot>> {
        for name in self.cache_names().await? {
            if let Some(entry) = self.get(&name, key).await? {
                return Ok(Some(entry.response));
            }
        }
        Ok(None)
    }
}
