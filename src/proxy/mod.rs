//! HTTP host for the service worker.
//!
//! Every request reaching the proxy is a fetch event for the worker, except
//! the control endpoints under `/__glimpse/`:
//!
//! - `POST /__glimpse/message` delivers a control message
//! - `GET /__glimpse/health` reports the worker state
//! - `GET /__glimpse/stats` reports strategy counters
//!
//! Same-origin requests the worker passes through are forwarded with the
//! same network the worker uses, so they still reach the upstream server.
//! Requests for any other origin are answered with `421 Misdirected Request`
//! and never forwarded.

mod convert;

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use reqwest::Url;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{AppConfig, ProxyConfig, StorageBackend};
use crate::error::{Error, Result};
use crate::message::MessageEvent;
use crate::network::{Network, ReqwestNetwork};
use crate::router::FetchOutcome;
use crate::storage::{CacheStorage, DiskStorage, MemoryStorage};
use crate::worker::{ServiceWorker, WorkerState};

/// Largest request body buffered for a fetch event.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

struct ProxyState<S, N> {
    worker: Arc<ServiceWorker<S, N>>,
    network: Arc<N>,
    public_origin: Url,
}

impl<S, N> Clone for ProxyState<S, N> {
    fn clone(&self) -> Self {
        Self {
            worker: Arc::clone(&self.worker),
            network: Arc::clone(&self.network),
            public_origin: self.public_origin.clone(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state: WorkerState,
}

async fn health<S, N>(State(state): State<ProxyState<S, N>>) -> impl IntoResponse
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    axum::Json(HealthResponse {
        status: "ok",
        state: state.worker.state(),
    })
}

async fn stats<S, N>(State(state): State<ProxyState<S, N>>) -> impl IntoResponse
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    axum::Json(state.worker.stats())
}

async fn message<S, N>(
    State(state): State<ProxyState<S, N>>,
    axum::Json(payload): axum::Json<serde_json::Value>,
) -> Response
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    match state.worker.message(MessageEvent::new(payload)).await {
        Some(ack) => axum::Json(ack).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn intercept<S, N>(State(state): State<ProxyState<S, N>>, request: Request) -> Response
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response(),
    };
    let request = match convert::fetch_request(&state.public_origin, parts.method, &parts.uri, parts.headers, body) {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let result = match state.worker.fetch(request).await {
        Ok(FetchOutcome::Responded { response, .. }) => Ok(response),
        Ok(FetchOutcome::Passthrough(request)) => {
            if request.url.origin() != state.public_origin.origin() {
                log::warn!("Refusing to forward cross-origin request for {}", request.url);
                return convert::misdirected(&request.url);
            }
            state.network.fetch(&request).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => convert::into_response(response),
        Err(e) => {
            log::warn!("{e}");
            convert::bad_gateway(&e)
        }
    }
}

fn router<S, N>(state: ProxyState<S, N>) -> Router
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let control = Router::new()
        .route("/__glimpse/health", get(health::<S, N>))
        .route("/__glimpse/stats", get(stats::<S, N>))
        .route("/__glimpse/message", post(message::<S, N>))
        .layer(cors);

    control.fallback(intercept::<S, N>).with_state(state)
}

fn parse_url(value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| Error::InvalidUrl(format!("{value}: {e}")))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
                    _ = sigterm.recv() => log::info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => log::warn!("Cannot listen for SIGTERM: {e}"),
        }
    }

    tokio::signal::ctrl_c().await.ok();
    log::info!("Received SIGINT");
}

/// Serves `worker` until SIGINT or SIGTERM, then waits for pending background
/// revalidations.
///
/// # Errors
///
/// Returns an error if the public origin is invalid or the address cannot be bound.
pub async fn serve<S, N>(worker: Arc<ServiceWorker<S, N>>, network: Arc<N>, config: &ProxyConfig) -> Result<()>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let app = router(ProxyState {
        worker: Arc::clone(&worker),
        network,
        public_origin: parse_url(&config.origin())?,
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Listening on http://{addr}, upstream {}", config.upstream);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Waiting for background revalidations");
    worker.settle_background().await;
    Ok(())
}

async fn launch<S>(config: &AppConfig, storage: Arc<S>, network: Arc<ReqwestNetwork>, origin: Url) -> Result<()>
where
    S: CacheStorage + 'static,
{
    let worker = Arc::new(ServiceWorker::new(&config.worker, origin, storage, Arc::clone(&network))?);
    if let Err(e) = worker.start().await {
        log::error!("Service worker failed to start ({e}), serving in passthrough mode");
    }
    serve(worker, network, &config.proxy).await
}

/// Builds the storage and network from `config`, starts a worker, and serves it.
///
/// # Errors
///
/// Returns an error if a URL in the config is invalid, the HTTP client or
/// disk storage cannot be created, or the server fails.
pub async fn run(config: AppConfig) -> Result<()> {
    let origin = parse_url(&config.proxy.origin())?;
    let upstream = parse_url(&config.proxy.upstream)?;
    let client = reqwest::Client::builder().build()?;
    let network = Arc::new(ReqwestNetwork::new(client).with_upstream(origin.clone(), upstream));

    match config.storage.backend {
        StorageBackend::Memory => {
            log::info!("Using in-memory cache storage");
            launch(&config, Arc::new(MemoryStorage::new()), network, origin).await
        }
        StorageBackend::Disk => {
            let dir = config.storage.resolved_dir();
            log::info!("Using disk cache storage at {}", dir.display());
            let storage = DiskStorage::open_dir(dir).await?;
            launch(&config, Arc::new(storage), network, origin).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::message::Ack;
    use crate::testing::{ORIGIN, ScriptedNetwork};
    use axum::body::Body;
    use axum::http::Method;
    use serde_json::json;

    async fn state(start: bool) -> (ProxyState<MemoryStorage, ScriptedNetwork>, Arc<ScriptedNetwork>) {
        let network = Arc::new(ScriptedNetwork::new());
        network
            .respond("/manifest.json", 200, "{}")
            .respond("/test.html", 200, "diagnostics")
            .respond("/offline.html", 200, "offline");
        let worker = ServiceWorker::new(
            &WorkerConfig::default(),
            parse_url(ORIGIN).unwrap(),
            Arc::new(MemoryStorage::new()),
            Arc::clone(&network),
        )
        .unwrap();
        if start {
            worker.start().await.unwrap();
        }
        let state = ProxyState {
            worker: Arc::new(worker),
            network: Arc::clone(&network),
            public_origin: parse_url(ORIGIN).unwrap(),
        };
        (state, network)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request(method: Method, uri: &str) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn intercepted_requests_are_cached() {
        let (state, network) = state(true).await;
        network.respond("/js/viewer.js", 200, "viewer");

        let response = intercept(State(state.clone()), request(Method::GET, "/js/viewer.js")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "viewer");

        network.set_offline(true);
        let response = intercept(State(state), request(Method::GET, "/js/viewer.js")).await;
        assert_eq!(body_text(response).await, "viewer");
        assert_eq!(network.calls_for("/js/viewer.js"), 1);
    }

    #[tokio::test]
    async fn passthrough_is_forwarded() {
        let (state, network) = state(false).await;
        network.respond("/api/login", 401, "denied");

        let response = intercept(State(state), request(Method::POST, "/api/login")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await, "denied");
    }

    #[tokio::test]
    async fn cross_origin_targets_are_not_forwarded() {
        for start in [true, false] {
            let (state, network) = state(start).await;
            network.respond_with(
                "/latest/meta-data/",
                crate::fetch::ResponseSnapshot::ok("text/plain", "local"),
            );

            for target in [
                "http://169.254.169.254/latest/meta-data/",
                "https://localhost:8787/latest/meta-data/",
            ] {
                let calls = network.calls();
                let response = intercept(State(state.clone()), request(Method::GET, target)).await;
                assert_eq!(response.status(), StatusCode::MISDIRECTED_REQUEST, "{target}");
                assert_eq!(network.calls(), calls, "{target} reached the network");
            }
        }
    }

    #[tokio::test]
    async fn absolute_form_for_own_origin_is_served() {
        let (state, network) = state(true).await;
        network.respond("/js/viewer.js", 200, "viewer");

        let target = format!("{ORIGIN}/js/viewer.js");
        let response = intercept(State(state), request(Method::GET, &target)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "viewer");
    }

    #[tokio::test]
    async fn failures_become_bad_gateway() {
        let (state, _network) = state(true).await;
        let response = intercept(State(state), request(Method::GET, "/data/plex/movies.json")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn control_messages_are_acknowledged() {
        let (state, _network) = state(true).await;

        let response = message(State(state.clone()), axum::Json(json!({"type": "CLEAR_DATA_CACHE"}))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let ack: Ack = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(ack, Ack::ok());

        let response = message(State(state), axum::Json(json!({"type": "NOPE"}))).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn health_reports_worker_state() {
        let (state, _network) = state(true).await;
        let response = health(State(state)).await.into_response();
        let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value, json!({"status": "ok", "state": "activated"}));
    }
}
