use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::limiter::{RateLimitDecision, SlidingWindowLimiter};
use super::policy::RateLimitPolicy;
use crate::config::RateLimitSettings;
use crate::error::GatewayError;
use crate::store::KeyValueStore;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const WINDOW_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-window");

/// Per-policy middleware state: one instance per protected route group, shared
/// across all requests.
#[derive(Clone)]
pub struct RateLimitState {
    policy: Arc<RateLimitPolicy>,
    limiter: Arc<SlidingWindowLimiter>,
    enabled: bool,
}

impl RateLimitState {
    pub fn new(policy: RateLimitPolicy, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            policy: Arc::new(policy),
            limiter: Arc::new(SlidingWindowLimiter::new(store)),
            enabled: true,
        }
    }

    /// Build from configuration, honoring the limiter kill switch.
    pub fn from_config(
        policy: RateLimitPolicy,
        store: Arc<dyn KeyValueStore>,
        settings: &RateLimitSettings,
    ) -> Self {
        Self::new(policy, store).with_enabled(settings.enabled)
    }

    /// Turn the middleware into a pass-through without detaching it.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }
}

/// Rate-limit middleware stage.
///
/// Evaluation completes (admit or deny) strictly before anything downstream
/// runs. Every response carries the `X-RateLimit-*` headers so clients can
/// self-throttle; denied requests get the structured 429 and never reach the
/// handler.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.enabled || state.policy.should_skip(&req) {
        return next.run(req).await;
    }

    let subject = state.policy.derive_subject(&req);
    let decision = state.limiter.evaluate(&state.policy, &subject).await;

    if !decision.admitted {
        state.policy.notify_limit_reached(&req, &subject);
        tracing::warn!(
            scope = %state.policy.scope,
            subject = %subject,
            path = %req.uri().path(),
            "rate limit exceeded"
        );
        let mut response = GatewayError::QuotaExceeded {
            message: state.policy.message.clone(),
            limit: decision.limit,
            window_ms: state.policy.window_ms(),
            reset_at_ms: decision.reset_at_ms,
            path: req.uri().path().to_string(),
        }
        .into_response();
        apply_rate_limit_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(req).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(
        RESET_HEADER,
        HeaderValue::from(decision.reset_at_ms / 1000),
    );
    headers.insert(
        WINDOW_HEADER,
        HeaderValue::from(decision.window.as_millis() as u64),
    );
}
