//! Caching strategies.
//!
//! Each strategy runs once per request and keeps no state beyond that
//! request/response pair; the only shared state is the cache storage.
//!
//! | Strategy | Serves | Writes |
//! |---|---|---|
//! | [`Strategy::CacheFirst`] | cache, else network | ok network responses |
//! | [`Strategy::AlwaysFresh`] | network, else legacy cached copy | never |
//! | [`Strategy::StaleWhileRevalidate`] | cache, else network | ok responses, in the background |
//! | [`Strategy::NetworkFirst`] | network (any status), else cache | ok network responses |
//!
//! HTML-accepting requests that fail on both layers get the offline page.

use std::fmt;
use std::sync::Arc;

use reqwest::header::{self, HeaderValue};
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;

use crate::classify::RequestClass;
use crate::error::{Error, Result};
use crate::fetch::{CacheKey, FetchRequest, ResponseSnapshot};
use crate::network::Network;
use crate::offline::offline_response;
use crate::stats::WorkerStats;
use crate::storage::CacheStorage;

/// How a request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Serve from cache; fetch and store on a miss.
    CacheFirst,
    /// Always fetch with caching disabled; never store.
    AlwaysFresh,
    /// Serve from cache immediately while refreshing it in the background.
    StaleWhileRevalidate,
    /// Fetch; fall back to the cache only when the network fails.
    NetworkFirst,
}

impl Strategy {
    /// Strategy used for a request class.
    #[must_use]
    pub const fn for_class(class: RequestClass) -> Self {
        match class {
            RequestClass::ThemedPage => Self::NetworkFirst,
            RequestClass::JsonData => Self::AlwaysFresh,
            RequestClass::ImageData => Self::StaleWhileRevalidate,
            RequestClass::StaticAsset => Self::CacheFirst,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CacheFirst => "cache-first",
            Self::AlwaysFresh => "always-fresh",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
            Self::NetworkFirst => "network-first",
        };
        f.write_str(name)
    }
}

/// Executes strategies against a storage and a network.
pub struct Strategies<S, N> {
    storage: Arc<S>,
    network: Arc<N>,
    dynamic_cache: Arc<str>,
    offline_key: CacheKey,
    background: TaskTracker,
    stats: Arc<WorkerStats>,
}

impl<S, N> Clone for Strategies<S, N> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            network: Arc::clone(&self.network),
            dynamic_cache: Arc::clone(&self.dynamic_cache),
            offline_key: self.offline_key.clone(),
            background: self.background.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<S, N> Strategies<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    /// Creates a strategy executor.
    ///
    /// Responses are written to `dynamic_cache`; the offline page is looked
    /// up under `offline_key`; background revalidations are spawned on
    /// `background`.
    #[must_use]
    pub fn new(
        storage: Arc<S>,
        network: Arc<N>,
        dynamic_cache: &str,
        offline_key: CacheKey,
        background: TaskTracker,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            storage,
            network,
            dynamic_cache: Arc::from(dynamic_cache),
            offline_key,
            background,
            stats,
        }
    }

    /// Answers `request` with `strategy`.
    ///
    /// # Errors
    ///
    /// Returns the network error when neither the network nor the caches can
    /// answer and the request does not accept HTML.
    pub async fn run(&self, strategy: Strategy, request: &FetchRequest) -> Result<ResponseSnapshot> {
        log::debug!("{strategy}: {} {}", request.method, request.url);
        match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::AlwaysFresh => self.always_fresh(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
        }
    }

    async fn cache_first(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        if let Some(cached) = self.lookup(request).await {
            return Ok(cached);
        }

        match self.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store(request, &response).await;
                }
                Ok(response)
            }
            Err(e) => {
                log::error!("Fetch failed for {}: {e}", request.url);
                self.offline_or(request, e).await
            }
        }
    }

    async fn always_fresh(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        match self.fetch(&request.without_caching()).await {
            Ok(mut response) => {
                response
                    .headers
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
                Ok(response)
            }
            Err(e) => {
                // Nothing on this path writes the cache; a hit here is a
                // copy left behind by an older worker version.
                if let Some(cached) = self.lookup(request).await {
                    log::warn!("Serving legacy cached copy of {}", request.url);
                    return Ok(cached);
                }
                log::error!("No cached response available for {}: {e}", request.url);
                Err(e)
            }
        }
    }

    async fn stale_while_revalidate(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        let revalidated = self.revalidate(request.clone());

        if let Some(cached) = self.lookup(request).await {
            return Ok(cached);
        }

        revalidated
            .await
            .unwrap_or_else(|_| Err(Error::Network(format!("revalidation of {} was aborted", request.url))))
    }

    async fn network_first(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        match self.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store(request, &response).await;
                } else {
                    log::debug!("Passing {} through for {}", response.status, request.url);
                }
                Ok(response)
            }
            Err(e) => {
                log::info!("Network request failed, trying cache: {}", request.url);
                if let Some(cached) = self.lookup(request).await {
                    return Ok(cached);
                }
                self.offline_or(request, e).await
            }
        }
    }

    /// Spawns a fetch that refreshes the dynamic cache. The receiver yields
    /// the network outcome for callers that had nothing cached; dropping it
    /// leaves the task running.
    fn revalidate(&self, request: FetchRequest) -> oneshot::Receiver<Result<ResponseSnapshot>> {
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        self.stats.revalidation();

        self.background.spawn(async move {
            let result = this.fetch(&request).await;
            match &result {
                Ok(response) if response.is_ok() => this.store(&request, response).await,
                Ok(response) => {
                    log::debug!("Not caching {} for {}", response.status, request.url);
                }
                Err(e) => {
                    this.stats.revalidation_failure();
                    log::warn!("Background revalidation failed for {}: {e}", request.url);
                }
            }
            let _ = tx.send(result);
        });

        rx
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        self.stats.network_fetch();
        self.network.fetch(request).await.inspect_err(|_| {
            self.stats.network_failure();
        })
    }

    /// A cache that cannot be read counts as a miss so the network still gets a chance.
    async fn lookup(&self, request: &FetchRequest) -> Option<ResponseSnapshot> {
        let cached = self
            .storage
            .match_any(&request.cache_key())
            .await
            .unwrap_or_else(|e| {
                log::warn!("Cache lookup failed for {}: {e}", request.url);
                None
            });
        if cached.is_some() {
            self.stats.cache_hit();
        } else {
            self.stats.cache_miss();
        }
        cached
    }

    /// Best effort: a failed write only costs a future cache hit.
    async fn store(&self, request: &FetchRequest, response: &ResponseSnapshot) {
        if let Err(e) = self
            .storage
            .put(&self.dynamic_cache, request.cache_key(), response.clone())
            .await
        {
            log::warn!("Failed to cache {}: {e}", request.url);
        }
    }

    async fn offline_or(&self, request: &FetchRequest, error: Error) -> Result<ResponseSnapshot> {
        if !request.accepts_html() {
            return Err(error);
        }
        self.stats.offline_served();
        match self.storage.match_any(&self.offline_key).await {
            Ok(Some(page)) => Ok(page),
            Ok(None) => Ok(offline_response()),
            Err(e) => {
                log::warn!("Offline page lookup failed, synthesizing: {e}");
                Ok(offline_response())
            }
        }
    }
}
