//! Fetch interception router: classify, then delegate to one strategy.

use reqwest::{Method, Url};

use crate::classify::{Classifier, RequestClass};
use crate::error::Result;
use crate::fetch::{FetchRequest, ResponseSnapshot};
use crate::network::Network;
use crate::storage::CacheStorage;
use crate::strategy::{Strategies, Strategy};

/// Why a request is left to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughReason {
    /// The request targets another origin.
    CrossOrigin,
    /// Only `GET` requests are cacheable.
    Method,
}

/// Routing decision for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the host performs its default fetch.
    Passthrough(PassthroughReason),
    /// Intercepted and answered by `strategy`.
    Intercept {
        /// Classification of the request path.
        class: RequestClass,
        /// Strategy selected for the class.
        strategy: Strategy,
    },
}

/// Result of handling a fetch event.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The worker declined; the request is handed back unchanged.
    Passthrough(FetchRequest),
    /// The worker answered.
    Responded {
        /// The response for the page.
        response: ResponseSnapshot,
        /// Strategy that produced it.
        strategy: Strategy,
    },
}

/// Routes intercepted requests to caching strategies.
pub struct FetchRouter<S, N> {
    origin: Url,
    classifier: Classifier,
    strategies: Strategies<S, N>,
}

impl<S, N> FetchRouter<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    /// Creates a router for requests issued by pages on `origin`.
    #[must_use]
    pub const fn new(origin: Url, classifier: Classifier, strategies: Strategies<S, N>) -> Self {
        Self {
            origin,
            classifier,
            strategies,
        }
    }

    /// The worker's own origin.
    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// Decides how a request is handled without performing any I/O.
    #[must_use]
    pub fn route(&self, request: &FetchRequest) -> Route {
        if request.url.origin() != self.origin.origin() {
            return Route::Passthrough(PassthroughReason::CrossOrigin);
        }
        if request.method != Method::GET {
            return Route::Passthrough(PassthroughReason::Method);
        }
        let class = self.classifier.classify(&request.url);
        Route::Intercept {
            class,
            strategy: Strategy::for_class(class),
        }
    }

    /// Handles a fetch event.
    ///
    /// # Errors
    ///
    /// Returns the strategy's error when the request could be answered by
    /// neither the network nor the caches.
    pub async fn handle(&self, request: FetchRequest) -> Result<FetchOutcome> {
        match self.route(&request) {
            Route::Passthrough(reason) => {
                log::trace!("Passthrough ({reason:?}): {} {}", request.method, request.url);
                Ok(FetchOutcome::Passthrough(request))
            }
            Route::Intercept { class, strategy } => {
                log::debug!("{} classified as {class}", request.url);
                let response = self.strategies.run(strategy, &request).await?;
                Ok(FetchOutcome::Responded { response, strategy })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RouteConfig;
    use crate::fetch::CacheKey;
    use crate::stats::WorkerStats;
    use crate::storage::MemoryStorage;
    use crate::testing::{ORIGIN, ScriptedNetwork, get, url};
    use tokio_util::task::TaskTracker;

    fn router(network: &Arc<ScriptedNetwork>) -> FetchRouter<MemoryStorage, ScriptedNetwork> {
        let strategies = Strategies::new(
            Arc::new(MemoryStorage::new()),
            Arc::clone(network),
            "dynamic",
            CacheKey::get(url("/offline.html")),
            TaskTracker::new(),
            Arc::new(WorkerStats::new()),
        );
        FetchRouter::new(
            Url::parse(ORIGIN).unwrap(),
            Classifier::new(&RouteConfig::default()),
            strategies,
        )
    }

    #[test]
    fn routes_by_class() {
        let router = router(&Arc::new(ScriptedNetwork::new()));
        let cases = [
            ("/", Strategy::NetworkFirst),
            ("/plex/index.html", Strategy::NetworkFirst),
            ("/data/plex/movies.json", Strategy::AlwaysFresh),
            ("/data/plex/art/9.jpg", Strategy::StaleWhileRevalidate),
            ("/js/viewer.js", Strategy::CacheFirst),
        ];
        for (path, expected) in cases {
            match router.route(&get(path)) {
                Route::Intercept { strategy, .. } => assert_eq!(strategy, expected, "{path}"),
                Route::Passthrough(reason) => panic!("{path} passed through: {reason:?}"),
            }
        }
    }

    #[tokio::test]
    async fn cross_origin_requests_are_not_intercepted() {
        let network = Arc::new(ScriptedNetwork::new());
        let router = router(&network);

        for target in [
            "https://fonts.example/font.woff2",
            "http://localhost:9999/app.js",
            "https://localhost:8787/app.js",
        ] {
            let request = FetchRequest::parse_get(target).unwrap();
            assert_eq!(
                router.route(&request),
                Route::Passthrough(PassthroughReason::CrossOrigin)
            );
            match router.handle(request).await.unwrap() {
                FetchOutcome::Passthrough(returned) => assert_eq!(returned.url.as_str(), target),
                FetchOutcome::Responded { .. } => panic!("{target} was intercepted"),
            }
        }
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn non_get_requests_pass_through() {
        let network = Arc::new(ScriptedNetwork::new());
        let router = router(&network);

        let request = FetchRequest::new(Method::POST, url("/data/plex/movies.json"));
        assert!(matches!(
            router.handle(request).await.unwrap(),
            FetchOutcome::Passthrough(_)
        ));
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn handle_reports_strategy() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/data/emby/list.json", 200, "[]");
        let router = router(&network);

        match router.handle(get("/data/emby/list.json")).await.unwrap() {
            FetchOutcome::Responded { response, strategy } => {
                assert_eq!(strategy, Strategy::AlwaysFresh);
                assert_eq!(response.body, "[]");
            }
            FetchOutcome::Passthrough(_) => panic!("same-origin JSON passed through"),
        }
    }
}
