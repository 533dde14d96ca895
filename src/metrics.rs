//! Prometheus metrics for the gateway.
//!
//! Counters for rate-limit decisions, cache hits/misses, and store failures;
//! a gauge for the cache entry count reported by stats collection.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    pub const RATE_LIMIT_DECISIONS_TOTAL: &str = "rate_limit_decisions_total";
    pub const CACHE_HITS_TOTAL: &str = "response_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "response_cache_misses_total";
    pub const CACHE_ENTRIES: &str = "response_cache_entries";
    pub const STORE_FAILURES_TOTAL: &str = "store_failures_total";
}

/// Install the Prometheus recorder. Call once at startup; returns `false` when
/// a recorder is already installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Record a rate-limit evaluation outcome for a policy scope.
pub fn record_rate_limit_decision(scope: &str, admitted: bool) {
    let outcome = if admitted { "admitted" } else { "denied" };
    counter!(
        names::RATE_LIMIT_DECISIONS_TOTAL,
        "scope" => scope.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a response-cache hit for a policy.
pub fn record_cache_hit(policy: &str) {
    counter!(names::CACHE_HITS_TOTAL, "policy" => policy.to_string()).increment(1);
}

/// Record a response-cache miss for a policy.
pub fn record_cache_miss(policy: &str) {
    counter!(names::CACHE_MISSES_TOTAL, "policy" => policy.to_string()).increment(1);
}

/// Set the number of cache entries (from stats collection).
pub fn set_cache_entries(count: usize) {
    gauge!(names::CACHE_ENTRIES).set(count as f64);
}

/// Record a swallowed store failure.
pub fn record_store_failure(operation: &'static str) {
    counter!(names::STORE_FAILURES_TOTAL, "operation" => operation).increment(1);
}
