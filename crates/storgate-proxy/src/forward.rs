//! Forwarding to the upstream array with credential substitution.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header::HeaderName};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, instrument};

use storgate_core::StorageSystem;
use storgate_vendor::SessionCredential;

use crate::errors::ApiError;
use crate::pathclean::clean_path;
use crate::state::AppState;

/// Bound on inbound bodies the mediator will buffer.
pub const BODY_LIMIT: usize = 10_000_000;

/// The upstream's answer, buffered so handlers can account on the status
/// before replying.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let mut builder = Response::builder().status(self.status);
        for (name, value) in self.headers.iter() {
            builder = builder.header(name, value);
        }
        builder
            .body(Body::from(self.body))
            .unwrap_or_else(|e| ApiError::internal(e.to_string()).into_response())
    }
}

/// The cleaned path plus the original query string.
pub fn path_and_query(uri: &Uri) -> String {
    let path = clean_path(uri.path());
    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    }
}

/// Forwards a request to the array, substituting the session credential
/// for whatever credentials the client sent.
///
/// Hop-by-hop headers (RFC 2616 §13.5.1) and client credentials are
/// stripped in both directions; method, path, query, and body pass through
/// untouched. A non-2xx upstream answer is not an error here — the caller
/// decides what it means for accounting.
#[instrument(skip_all, fields(system_id = %system_id, method = %method, path = %target_path))]
pub async fn forward(
    state: &AppState,
    system_id: &str,
    system: &StorageSystem,
    credential: &SessionCredential,
    method: Method,
    target_path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<UpstreamResponse, ApiError> {
    let target = format!("{}{target_path}", system.endpoint.trim_end_matches('/'));

    let mut out_headers = HeaderMap::new();
    for (name, value) in headers.iter() {
        if is_hop_by_hop_header(name.as_str()) || is_credential_header(name.as_str()) {
            continue;
        }
        out_headers.insert(name.clone(), value.clone());
    }

    let credential_name = HeaderName::try_from(credential.header_name.as_str())
        .map_err(|e| ApiError::internal(format!("bad credential header name: {e}")))?;
    let credential_value = HeaderValue::from_str(&credential.header_value)
        .map_err(|e| ApiError::internal(format!("bad credential header value: {e}")))?;
    out_headers.insert(credential_name, credential_value);

    let response = state
        .forward_client(system_id, system)?
        .request(method, &target)
        .headers(out_headers)
        .body(body)
        .timeout(state.forward_timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ApiError::bad_gateway(format!("upstream timed out: {e}"))
            } else {
                ApiError::bad_gateway(format!("upstream unreachable: {e}"))
            }
        })?;

    let status = response.status();
    let mut response_headers = HeaderMap::new();
    for (name, value) in response.headers().iter() {
        if !is_hop_by_hop_header(name.as_str()) {
            response_headers.insert(name.clone(), value.clone());
        }
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::bad_gateway(format!("upstream body unreadable: {e}")))?;

    debug!(status = %status, "upstream replied");
    Ok(UpstreamResponse {
        status,
        headers: response_headers,
        body,
    })
}

// The connection-scoped header set of RFC 2616 §13.5.1. These describe the
// hop between client and proxy, not the request itself, so they never cross
// to the array.
const CONNECTION_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "te",
    "trailers",
    "upgrade",
    "transfer-encoding",
    "proxy-authenticate",
    "proxy-authorization",
];

/// Whether a header belongs to the hop and must be dropped from a forward.
///
/// `host` is treated the same way: the outbound host comes from the
/// registered array endpoint, never from the client.
fn is_hop_by_hop_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "host" || CONNECTION_HEADERS.contains(&name.as_str())
}

/// Client credentials and proxy-internal routing never reach the array.
fn is_credential_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "authorization" | "cookie" | "set-cookie" | "forwarded"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_scoped_headers_are_dropped() {
        // Case-insensitive across the whole RFC set, plus host.
        for name in CONNECTION_HEADERS {
            assert!(is_hop_by_hop_header(name), "{name}");
            assert!(is_hop_by_hop_header(&name.to_ascii_uppercase()), "{name}");
        }
        assert!(is_hop_by_hop_header("Host"));
    }

    #[test]
    fn test_end_to_end_headers_survive() {
        for name in ["content-type", "Accept", "x-request-id", "content-length"] {
            assert!(!is_hop_by_hop_header(name), "{name}");
        }
        // Credentials are stripped by the other filter, not this one.
        assert!(!is_hop_by_hop_header("Authorization"));
    }

    #[test]
    fn test_is_credential_header() {
        assert!(is_credential_header("Authorization"));
        assert!(is_credential_header("Cookie"));
        assert!(is_credential_header("Forwarded"));
        assert!(!is_credential_header("Content-Type"));
    }

    #[test]
    fn test_path_and_query() {
        let uri: Uri = "/api//types/./Volume/instances?limit=5".parse().unwrap();
        assert_eq!(path_and_query(&uri), "/api/types/Volume/instances?limit=5");

        let uri: Uri = "/api/login".parse().unwrap();
        assert_eq!(path_and_query(&uri), "/api/login");
    }
}
