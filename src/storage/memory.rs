//! In-memory cache storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheEntry, CacheStorage};
use crate::error::Result;
use crate::fetch::{CacheKey, ResponseSnapshot};

#[derive(Debug, Default)]
struct NamedCache {
    name: String,
    entries: HashMap<CacheKey, CacheEntry>,
}

/// Cache storage that lives in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    // Vec keeps creation order for `match_any`.
    caches: RwLock<Vec<NamedCache>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn position(caches: &[NamedCache], name: &str) -> Option<usize> {
    caches.iter().position(|c| c.name == name)
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn cache_names(&self) -> Result<Vec<String>> {
        Ok(self.caches.read().await.iter().map(|c| c.name.clone()).collect())
    }

    async fn open(&self, cache: &str) -> Result<()> {
        let mut caches = self.caches.write().await;
        if position(&caches, cache).is_none() {
            caches.push(NamedCache {
                name: cache.to_string(),
                entries: HashMap::new(),
            });
        }
        Ok(())
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool> {
        let mut caches = self.caches.write().await;
        Ok(position(&caches, cache)
            .map(|index| caches.remove(index))
            .is_some())
    }

    async fn get(&self, cache: &str, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let caches = self.caches.read().await;
        Ok(position(&caches, cache).and_then(|index| caches[index].entries.get(key).cloned()))
    }

    async fn put(&self, cache: &str, key: CacheKey, response: ResponseSnapshot) -> Result<()> {
        let mut caches = self.caches.write().await;
        let index = if let Some(index) = position(&caches, cache) {
            index
        } else {
            caches.push(NamedCache {
                name: cache.to_string(),
                entries: HashMap::new(),
            });
            caches.len() - 1
        };
        let entry = CacheEntry::new(key.clone(), response);
        caches[index].entries.insert(key, entry);
        Ok(())
    }

    async fn remove(&self, cache: &str, key: &CacheKey) -> Result<bool> {
        let mut caches = self.caches.write().await;
        Ok(position(&caches, cache)
            .is_some_and(|index| caches[index].entries.remove(key).is_some()))
    }

    async fn keys(&self, cache: &str) -> Result<Vec<CacheKey>> {
        let caches = self.caches.read().await;
        Ok(position(&caches, cache)
            .map(|index| caches[index].entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}
