use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::entry::CachedResponse;
use super::policy::CachePolicy;
use crate::config::CacheSettings;
use crate::error::GatewayError;
use crate::metrics;
use crate::rate_limit::limiter::epoch_ms;
use crate::store::KeyValueStore;

const CACHE_HEADER: HeaderName = HeaderName::from_static("x-cache");
const CACHE_KEY_HEADER: HeaderName = HeaderName::from_static("x-cache-key");

/// Per-policy middleware state, one instance per cached route group.
#[derive(Clone)]
pub struct ResponseCacheState {
    policy: Arc<CachePolicy>,
    store: Arc<dyn KeyValueStore>,
    enabled: bool,
}

impl ResponseCacheState {
    pub fn new(policy: CachePolicy, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            policy: Arc::new(policy),
            store,
            enabled: true,
        }
    }

    /// Build from configuration, honoring the cache kill switch.
    pub fn from_config(
        policy: CachePolicy,
        store: Arc<dyn KeyValueStore>,
        settings: &CacheSettings,
    ) -> Self {
        Self::new(policy, store).with_enabled(settings.enabled)
    }

    /// Turn the middleware into a pass-through without detaching it.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }
}

/// Response-cache middleware stage.
///
/// A hit short-circuits the pipeline: the stored response is replayed and the
/// downstream handler never runs. A miss runs the handler, captures the
/// finalized status and body, and stores 2xx responses on a detached task so
/// client latency is unaffected by the write.
pub async fn response_cache(
    State(state): State<ResponseCacheState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.enabled || req.method() != Method::GET || state.policy.should_skip(&req) {
        return next.run(req).await;
    }

    let key = state.policy.derive_key(&req);

    match state.store.get(&key).await {
        Ok(Some(bytes)) => match CachedResponse::from_bytes(&bytes) {
            Ok(entry) => {
                metrics::record_cache_hit(state.policy.name);
                tracing::debug!(key = %key, policy = %state.policy.name, "cache hit");
                let mut response = entry.into_response();
                apply_cache_headers(&mut response, "HIT", &key, state.policy.ttl);
                return response;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "corrupt cache entry; dropping");
                let store = state.store.clone();
                let stale = key.clone();
                tokio::spawn(async move {
                    let _ = store.delete(&[stale]).await;
                });
            }
        },
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "cache lookup failed; treating as miss");
            metrics::record_store_failure("cache_get");
        }
    }

    metrics::record_cache_miss(state.policy.name);
    let response = next.run(req).await;
    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "failed to buffer response body");
            return GatewayError::Body(e).into_response();
        }
    };

    // Only 2xx responses are stored; errors and redirects always re-execute.
    if parts.status.is_success() {
        let entry = CachedResponse::capture(parts.status, &parts.headers, &bytes, epoch_ms());
        let policy = state.policy.clone();
        let store = state.store.clone();
        let entry_key = key.clone();
        tokio::spawn(async move {
            store_entry(store, policy, entry_key, entry).await;
        });
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    apply_cache_headers(&mut response, "MISS", &key, state.policy.ttl);
    response
}

/// Fire-and-forget population: the primary entry first, then best-effort tag
/// plumbing. A tag failure only costs future tag-based invalidation of this
/// key; the entry itself stays valid.
async fn store_entry(
    store: Arc<dyn KeyValueStore>,
    policy: Arc<CachePolicy>,
    key: String,
    entry: CachedResponse,
) {
    let encoded = match entry.to_bytes() {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "failed to serialize cache entry");
            return;
        }
    };

    if let Err(e) = store.set_with_ttl(&key, encoded, policy.ttl).await {
        tracing::warn!(key = %key, error = %e, "cache write failed");
        metrics::record_store_failure("cache_set");
        return;
    }
    tracing::debug!(key = %key, policy = %policy.name, ttl_secs = policy.ttl.as_secs(), "cache entry stored");

    if policy.tags.is_empty() {
        return;
    }

    match serde_json::to_vec(&policy.tags) {
        Ok(tags_record) => {
            if let Err(e) = store
                .set_with_ttl(&format!("{key}:tags"), tags_record, policy.ttl)
                .await
            {
                tracing::warn!(key = %key, error = %e, "failed to write tag record");
            }
        }
        Err(e) => tracing::warn!(key = %key, error = %e, "failed to serialize tag record"),
    }

    for tag in &policy.tags {
        if let Err(e) = store
            .set_add(&format!("tag_index:{tag}"), &[key.clone()], policy.ttl)
            .await
        {
            tracing::warn!(key = %key, tag = %tag, error = %e, "failed to index cache tag");
        }
    }
}

fn apply_cache_headers(response: &mut Response, outcome: &'static str, key: &str, ttl: Duration) {
    let headers = response.headers_mut();
    headers.insert(CACHE_HEADER, HeaderValue::from_static(outcome));
    if let Ok(value) = HeaderValue::from_str(key) {
        headers.insert(CACHE_KEY_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", ttl.as_secs())) {
        headers.insert(axum::http::header::CACHE_CONTROL, value);
    }
}
