//! Stored cache entry, serialized as MessagePack for compact storage.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use serde::{Deserialize, Serialize};

/// Response headers preserved across the cache. Everything else is
/// request-scoped (connection, date, tracing) and regenerated on replay.
const CAPTURED_HEADERS: [&str; 4] = ["content-type", "etag", "last-modified", "content-language"];

/// A captured downstream response. Immutable once written; a concurrent
/// re-population simply overwrites with identical content.
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at_ms: i64,
}

impl CachedResponse {
    pub fn capture(
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        stored_at_ms: i64,
    ) -> Self {
        let headers = CAPTURED_HEADERS
            .iter()
            .filter_map(|name| {
                headers
                    .get(*name)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        Self {
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
            stored_at_ms,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }

    /// Replay the stored response verbatim. Cache bookkeeping headers are
    /// added by the middleware, not here.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_messagepack() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-request-id", "ignored".parse().unwrap());

        let entry = CachedResponse::capture(StatusCode::OK, &headers, b"{\"ok\":true}", 1234);
        let decoded = CachedResponse::from_bytes(&entry.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.status, 200);
        assert_eq!(decoded.body, b"{\"ok\":true}");
        assert_eq!(decoded.stored_at_ms, 1234);
        assert_eq!(
            decoded.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn replay_restores_status_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/plain".parse().unwrap());
        let entry = CachedResponse::capture(StatusCode::CREATED, &headers, b"made", 0);

        let response = entry.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain"
        );
    }

    #[test]
    fn corrupt_bytes_fail_to_decode() {
        assert!(CachedResponse::from_bytes(b"not messagepack").is_err());
    }
}
