//! Network abstraction for testability.

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{self, HeaderMap};

use crate::error::Result;
use crate::fetch::{FetchRequest, ResponseSnapshot};

/// Abstraction over the network fetch primitive.
///
/// Implementations return `Ok` for every HTTP response, whatever its status;
/// `Err` means the request could not be completed at all.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request and buffers the full response.
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot>;
}

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [header::HeaderName; 6] = [
    header::CONNECTION,
    header::HOST,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
    header::TE,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

/// Network implementation backed by `reqwest`.
///
/// With an upstream configured, requests addressed to the worker's own origin
/// are sent to the upstream origin instead, keeping path and query.
#[derive(Debug, Clone)]
pub struct ReqwestNetwork {
    client: reqwest::Client,
    upstream: Option<(Url, Url)>,
}

impl ReqwestNetwork {
    /// Creates a network that fetches URLs as given.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            upstream: None,
        }
    }

    /// Routes requests for `origin` to `upstream`.
    #[must_use]
    pub fn with_upstream(mut self, origin: Url, upstream: Url) -> Self {
        self.upstream = Some((origin, upstream));
        self
    }

    /// Returns the URL the request is actually sent to.
    #[must_use]
    pub fn resolve(&self, url: &Url) -> Url {
        match &self.upstream {
            Some((origin, upstream)) if url.origin() == origin.origin() => {
                let mut target = upstream.clone();
                target.set_path(url.path());
                target.set_query(url.query());
                target
            }
            _ => url.clone(),
        }
    }
}

#[async_trait]
impl Network for ReqwestNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        let target = self.resolve(&request.url);
        log::trace!("fetch {} {target}", request.method);

        let mut builder = self
            .client
            .request(request.method.clone(), target)
            .headers(strip_hop_by_hop(&request.headers));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());
        let body = response.bytes().await?;

        Ok(ResponseSnapshot {
            status,
            headers,
            body,
        })
    }
}
