//! Conversions between axum's HTTP types and the worker's snapshots.

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::fetch::{FetchRequest, ResponseSnapshot};

/// Resolves the request target to an absolute URL.
///
/// Origin-form targets (`/path?query`) belong to `public_origin`; absolute-form
/// targets, as sent to a forward proxy, keep their own origin.
pub fn request_url(public_origin: &Url, uri: &Uri) -> Result<Url> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string()).map_err(|e| Error::InvalidUrl(format!("{uri}: {e}")));
    }
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    public_origin
        .join(target)
        .map_err(|e| Error::InvalidUrl(format!("{target}: {e}")))
}

/// Builds the fetch event payload for an incoming request.
pub fn fetch_request(
    public_origin: &Url,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<FetchRequest> {
    Ok(FetchRequest {
        method,
        url: request_url(public_origin, uri)?,
        headers,
        body: (!body.is_empty()).then_some(body),
    })
}

/// Turns a snapshot into the response sent to the client.
pub fn into_response(snapshot: ResponseSnapshot) -> Response {
    let mut response = Response::new(Body::from(snapshot.body));
    *response.status_mut() = snapshot.status;
    *response.headers_mut() = snapshot.headers;
    response
}

/// Response for a request neither the worker nor the network could answer.
pub fn bad_gateway(error: &Error) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("Bad gateway: {error}"),
    )
        .into_response()
}

/// Response for a request addressed to an origin this proxy does not serve.
pub fn misdirected(url: &Url) -> Response {
    (
        StatusCode::MISDIRECTED_REQUEST,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("Misdirected request: {} is not served here", url.origin().ascii_serialization()),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn origin() -> Url {
        Url::parse("http://glimpse.lan:8787").unwrap()
    }

    #[test]
    fn origin_form_joins_public_origin() {
        let uri: Uri = "/data/plex/movies.json?t=2".parse().unwrap();
        assert_eq!(
            request_url(&origin(), &uri).unwrap().as_str(),
            "http://glimpse.lan:8787/data/plex/movies.json?t=2"
        );

        let root: Uri = "/".parse().unwrap();
        assert_eq!(request_url(&origin(), &root).unwrap().as_str(), "http://glimpse.lan:8787/");
    }

    #[test]
    fn absolute_form_keeps_its_origin() {
        let uri: Uri = "https://cdn.example/font.woff2".parse().unwrap();
        let url = request_url(&origin(), &uri).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/font.woff2");
        assert_ne!(url.origin(), origin().origin());
    }

    #[test]
    fn empty_bodies_are_dropped() {
        let uri: Uri = "/".parse().unwrap();
        let request = fetch_request(&origin(), Method::GET, &uri, HeaderMap::new(), Bytes::new()).unwrap();
        assert!(request.body.is_none());

        let request =
            fetch_request(&origin(), Method::POST, &uri, HeaderMap::new(), Bytes::from_static(b"x")).unwrap();
        assert_eq!(request.body.as_deref(), Some(&b"x"[..]));
    }

    #[test]
    fn snapshot_becomes_response() {
        let mut snapshot = ResponseSnapshot::new(StatusCode::NOT_FOUND, "gone");
        snapshot
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let response = into_response(snapshot);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn foreign_origins_are_misdirected() {
        let url = Url::parse("http://169.254.169.254/latest/meta-data/").unwrap();
        assert_eq!(misdirected(&url).status(), StatusCode::MISDIRECTED_REQUEST);
    }

    #[test]
    fn failures_are_bad_gateway() {
        let response = bad_gateway(&Error::Network("offline".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
