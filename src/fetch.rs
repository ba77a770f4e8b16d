//! Request and response snapshots exchanged between the host, the router,
//! the network, and cache storage.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};

use crate::error::{Error, Result};

/// Identity of a cached request: HTTP method plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Request method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
}

impl CacheKey {
    /// Creates a key for a `GET` of `url`.
    #[must_use]
    pub const fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body, if any.
    pub body: Option<Bytes>,
}

impl FetchRequest {
    /// Creates a request with no headers or body.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a `GET` request for `url`.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parses `url` and creates a `GET` request for it.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not an absolute URL.
    pub fn parse_get(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::get(url))
    }

    /// Adds a header, replacing any existing value.
    #[must_use]
    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Marks the request as a browser navigation accepting HTML.
    #[must_use]
    pub fn accepting_html(self) -> Self {
        self.with_header(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
        )
    }

    /// Returns true if the `Accept` header includes `text/html`.
    #[must_use]
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("text/html"))
    }

    /// Returns a copy with end-to-end no-cache directives set, so neither the
    /// upstream nor any intermediary answers from its own cache.
    #[must_use]
    pub fn without_caching(&self) -> Self {
        let mut request = self.clone();
        request.headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        request
            .headers
            .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        request
    }

    /// Cache key for this request.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            method: self.method.clone(),
            url: self.url.clone(),
        }
    }
}

/// A response captured in full: status, headers, and body bytes.
///
/// Cloning is cheap; the body is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl ResponseSnapshot {
    /// Creates a snapshot with no headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Creates a `200 OK` snapshot with the given content type.
    #[must_use]
    pub fn ok(content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut response = Self::new(StatusCode::OK, body);
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the content type header, if present and valid UTF-8.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_html_checks_every_accept_value() {
        let request = FetchRequest::parse_get("http://localhost/").unwrap();
        assert!(!request.accepts_html());
        assert!(request.clone().accepting_html().accepts_html());

        let json = request.with_header(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!json.accepts_html());
    }

    #[test]
    fn without_caching_sets_directives_and_keeps_original() {
        let request = FetchRequest::parse_get("http://localhost/data/a.json").unwrap();
        let fresh = request.without_caching();

        assert_eq!(
            fresh.headers.get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(fresh.headers.get(header::PRAGMA).unwrap(), "no-cache");
        assert!(request.headers.is_empty());
        assert_eq!(fresh.cache_key(), request.cache_key());
    }

    #[test]
    fn cache_key_includes_method() {
        let url = Url::parse("http://localhost/x").unwrap();
        let get = FetchRequest::get(url.clone()).cache_key();
        let head = FetchRequest::new(Method::HEAD, url.clone()).cache_key();

        assert_eq!(get, CacheKey::get(url));
        assert_ne!(get, head);
        assert_eq!(get.to_string(), "GET http://localhost/x");
    }

    #[test]
    fn parse_get_rejects_relative_urls() {
        let err = FetchRequest::parse_get("/index.html").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn snapshot_status_helpers() {
        let ok = ResponseSnapshot::ok("text/plain", "hi");
        assert!(ok.is_ok());
        assert_eq!(ok.content_type(), Some("text/plain"));

        let missing = ResponseSnapshot::new(StatusCode::NOT_FOUND, "");
        assert!(!missing.is_ok());
        assert_eq!(missing.content_type(), None);
    }
}
