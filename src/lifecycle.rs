//! Cache lifecycle: install-time precache, activation-time cleanup, and
//! explicit invalidation.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use reqwest::Url;

use crate::classify::Classifier;
use crate::config::{CacheConfig, PrecacheConfig};
use crate::error::{Error, Result};
use crate::fetch::{CacheKey, FetchRequest};
use crate::message::ControlMessage;
use crate::network::Network;
use crate::offline::offline_response;
use crate::storage::CacheStorage;

/// Where the installed offline page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineSource {
    /// Fetched from the server.
    Network,
    /// Built from the embedded template.
    Synthesized,
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Manifest assets stored in the static cache.
    pub precached: usize,
    /// Origin of the offline page.
    pub offline: OfflineSource,
}

/// Outcome of an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Caches deleted because they belonged to another version.
    pub deleted: Vec<String>,
}

/// Creates, purges, and invalidates the application's named caches.
pub struct LifecycleManager<S, N> {
    storage: Arc<S>,
    network: Arc<N>,
    origin: Url,
    cache: CacheConfig,
    precache: PrecacheConfig,
    classifier: Classifier,
}

impl<S, N> LifecycleManager<S, N>
where
    S: CacheStorage,
    N: Network,
{
    /// Creates a manager for the caches described by `cache`.
    #[must_use]
    pub const fn new(
        storage: Arc<S>,
        network: Arc<N>,
        origin: Url,
        cache: CacheConfig,
        precache: PrecacheConfig,
        classifier: Classifier,
    ) -> Self {
        Self {
            storage,
            network,
            origin,
            cache,
            precache,
            classifier,
        }
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.origin
            .join(path)
            .map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
    }

    /// Cache key of the offline page.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured path does not resolve against the origin.
    pub fn offline_key(&self) -> Result<CacheKey> {
        Ok(CacheKey::get(self.resolve(&self.precache.offline_page)?))
    }

    /// Populates the static cache.
    ///
    /// The manifest is all-or-nothing: every asset must fetch with an ok
    /// status before any is stored. The offline page is fetched alongside and
    /// synthesized if the network cannot provide it.
    ///
    /// # Errors
    ///
    /// Returns an error if a manifest asset fails or storage fails.
    pub async fn install(&self) -> Result<InstallReport> {
        let static_name = self.cache.static_name();
        log::info!("Service worker: caching static files into {static_name}");
        self.storage.open(&static_name).await?;

        let (precached, offline) = futures::try_join!(
            self.precache_manifest(&static_name),
            self.install_offline_page(&static_name)
        )?;

        log::info!("Service worker: all static assets added to cache");
        Ok(InstallReport { precached, offline })
    }

    async fn precache_manifest(&self, static_name: &str) -> Result<usize> {
        let requests = self
            .precache
            .assets
            .iter()
            .map(|path| self.resolve(path).map(FetchRequest::get))
            .collect::<Result<Vec<_>>>()?;

        let responses = try_join_all(requests.iter().map(|request| async move {
            let response = self.network.fetch(request).await?;
            if response.is_ok() {
                Ok(response)
            } else {
                Err(Error::Precache {
                    url: request.url.to_string(),
                    status: response.status.as_u16(),
                })
            }
        }))
        .await?;

        for (request, response) in requests.iter().zip(responses) {
            self.storage
                .put(static_name, request.cache_key(), response)
                .await?;
        }
        Ok(requests.len())
    }

    async fn install_offline_page(&self, static_name: &str) -> Result<OfflineSource> {
        let key = self.offline_key()?;
        let request = FetchRequest::get(key.url.clone());

        let (response, source) = match self.network.fetch(&request).await {
            Ok(response) if response.is_ok() => (response, OfflineSource::Network),
            Ok(response) => {
                log::info!("Offline page returned {}, using embedded copy", response.status);
                (offline_response(), OfflineSource::Synthesized)
            }
            Err(e) => {
                log::info!("Offline page unavailable ({e}), using embedded copy");
                (offline_response(), OfflineSource::Synthesized)
            }
        };

        self.storage.put(static_name, key, response).await?;
        Ok(source)
    }

    /// Deletes every owned cache that is not one of the two current caches.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache list cannot be read or a deletion fails.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let stale: Vec<String> = self
            .storage
            .cache_names()
            .await?
            .into_iter()
            .filter(|name| self.cache.owns(name) && !self.cache.is_current(name))
            .collect();

        try_join_all(stale.iter().map(|name| async move {
            log::info!("Service worker: clearing old cache {name}");
            self.storage.delete_cache(name).await
        }))
        .await?;

        Ok(ActivationReport { deleted: stale })
    }

    /// Executes an invalidation command. Returns the number of entries or
    /// caches removed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn invalidate(&self, command: ControlMessage) -> Result<usize> {
        match command {
            ControlMessage::ClearThemedCache => self.clear_themed().await,
            ControlMessage::ClearDataCache => self.clear_data().await,
            ControlMessage::ClearAllCache => self.clear_all().await,
        }
    }

    /// Removes every themed route from the dynamic cache.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn clear_themed(&self) -> Result<usize> {
        let dynamic = self.cache.dynamic_name();
        let keys = self
            .classifier
            .themed_paths()
            .map(|path| self.resolve(path).map(CacheKey::get))
            .collect::<Result<Vec<_>>>()?;

        let removed = try_join_all(keys.iter().map(|key| self.storage.remove(&dynamic, key))).await?;
        let count = removed.into_iter().filter(|r| *r).count();
        log::info!("Cleared {count} themed pages from {dynamic}");
        Ok(count)
    }

    /// Removes every data-directory entry from the dynamic cache.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn clear_data(&self) -> Result<usize> {
        let dynamic = self.cache.dynamic_name();
        let keys: Vec<CacheKey> = self
            .storage
            .keys(&dynamic)
            .await?
            .into_iter()
            .filter(|key| self.classifier.is_data_path(key.url.path()))
            .collect();

        let removed = try_join_all(keys.iter().map(|key| self.storage.remove(&dynamic, key))).await?;
        let count = removed.into_iter().filter(|r| *r).count();
        log::info!("Cleared {count} data entries from {dynamic}");
        Ok(count)
    }

    /// Deletes every cache this application owns.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails. Deletions already issued still complete.
    pub async fn clear_all(&self) -> Result<usize> {
        let owned: Vec<String> = self
            .storage
            .cache_names()
            .await?
            .into_iter()
            .filter(|name| self.cache.owns(name))
            .collect();

        let results = join_all(owned.iter().map(|name| self.storage.delete_cache(name))).await;
        let mut count = 0;
        for result in results {
            if result? {
                count += 1;
            }
        }
        log::info!("Cleared {count} caches");
        Ok(count)
    }
}
