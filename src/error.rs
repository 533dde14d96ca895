use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::store::StoreError;

/// Gateway error taxonomy.
///
/// Only `QuotaExceeded` carries a client-facing contract. Store errors are
/// recovered locally (fail-open limiter, fail-to-miss cache), configuration
/// errors are fatal at startup, and response-buffering failures map to the
/// opaque 500 envelope.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rate limit exceeded: {message}")]
    QuotaExceeded {
        message: String,
        limit: u32,
        window_ms: u64,
        reset_at_ms: i64,
        path: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to buffer response body: {0}")]
    Body(#[from] axum::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Convenience result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Epoch milliseconds as an RFC 3339 timestamp, falling back to the raw number
/// if the value is out of range.
pub(crate) fn iso8601_ms(epoch_ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| epoch_ms.to_string())
}

pub(crate) fn now_iso8601() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::QuotaExceeded {
                message,
                limit,
                window_ms,
                reset_at_ms,
                path,
            } => {
                let body = json!({
                    "success": false,
                    "error": {
                        "code": "RATE_LIMIT_EXCEEDED",
                        "message": message,
                        "details": {
                            "limit": limit,
                            "windowMs": window_ms,
                            "resetTime": iso8601_ms(reset_at_ms),
                            "remainingRequests": 0,
                        },
                    },
                    "timestamp": now_iso8601(),
                    "path": path,
                });
                (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
            }
            other => {
                tracing::error!(error = %other, "internal gateway error reached the response boundary");
                let body = json!({
                    "success": false,
                    "error": {
                        "code": "INTERNAL_ERROR",
                        "message": "Internal server error",
                    },
                    "timestamp": now_iso8601(),
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_formats_epoch_millis() {
        assert_eq!(iso8601_ms(0), "1970-01-01T00:00:00Z");
        assert!(iso8601_ms(1_693_526_400_000).starts_with("2023-"));
    }

    #[tokio::test]
    async fn quota_exceeded_maps_to_429_with_machine_readable_code() {
        let err = GatewayError::QuotaExceeded {
            message: "Too many requests".into(),
            limit: 3,
            window_ms: 60_000,
            reset_at_ms: 60_000,
            path: "/api/listings".into(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["error"]["details"]["limit"], 3);
        assert_eq!(body["error"]["details"]["windowMs"], 60_000);
        assert_eq!(body["error"]["details"]["remainingRequests"], 0);
        assert_eq!(body["path"], "/api/listings");
    }

    #[tokio::test]
    async fn internal_errors_use_the_structured_envelope() {
        let err = GatewayError::Body(axum::Error::new(std::io::Error::other("stream reset")));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(body["timestamp"].is_string());
    }
}
