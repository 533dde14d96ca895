use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use uuid::Uuid;

use super::policy::RateLimitPolicy;
use crate::metrics;
use crate::store::KeyValueStore;

/// Outcome of one rate-limit evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub admitted: bool,
    pub limit: u32,
    /// Requests left in the window after this one.
    pub remaining: u32,
    /// Epoch milliseconds at which the oldest counted entry leaves the window.
    pub reset_at_ms: i64,
    pub window: Duration,
}

/// Stateless sliding-window evaluator. All counting state lives in the store;
/// one instance is shared across every policy and request.
pub struct SlidingWindowLimiter {
    store: Arc<dyn KeyValueStore>,
}

pub(crate) fn epoch_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Evaluate `policy` for `subject` and, when admitted, record the request
    /// so subsequent evaluations count it.
    ///
    /// Denied requests are not recorded. A store failure admits the request
    /// (fail-open) with synthesized header values.
    pub async fn evaluate(&self, policy: &RateLimitPolicy, subject: &str) -> RateLimitDecision {
        let now_ms = epoch_ms();
        let window_ms = policy.window.as_millis() as i64;
        let key = policy.storage_key(subject);

        let snapshot = match self
            .store
            .window_slide(&key, now_ms - window_ms, policy.window)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "rate limit store failed; failing open");
                metrics::record_store_failure("window_slide");
                metrics::record_rate_limit_decision(policy.scope, true);
                return RateLimitDecision {
                    admitted: true,
                    limit: policy.max_requests,
                    remaining: policy.max_requests.saturating_sub(1),
                    reset_at_ms: now_ms + window_ms,
                    window: policy.window,
                };
            }
        };

        let window_start = snapshot.oldest_score_ms.unwrap_or(now_ms);

        if snapshot.count >= u64::from(policy.max_requests) {
            metrics::record_rate_limit_decision(policy.scope, false);
            return RateLimitDecision {
                admitted: false,
                limit: policy.max_requests,
                remaining: 0,
                reset_at_ms: window_start + window_ms,
                window: policy.window,
            };
        }

        // The nonce avoids score collisions when requests share a millisecond.
        let member = format!("{now_ms}-{}", Uuid::new_v4());
        if let Err(e) = self
            .store
            .window_record(&key, now_ms, &member, policy.window)
            .await
        {
            tracing::warn!(key = %key, error = %e, "failed to record rate limit entry; failing open");
            metrics::record_store_failure("window_record");
        }

        metrics::record_rate_limit_decision(policy.scope, true);
        RateLimitDecision {
            admitted: true,
            limit: policy.max_requests,
            remaining: policy.max_requests - snapshot.count as u32 - 1,
            reset_at_ms: window_start + window_ms,
            window: policy.window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::policy::presets;
    use crate::store::MemoryStore;

    fn limiter_with_store() -> (SlidingWindowLimiter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SlidingWindowLimiter::new(store.clone()), store)
    }

    #[tokio::test]
    async fn remaining_decreases_monotonically() {
        let (limiter, _) = limiter_with_store();
        let policy = RateLimitPolicy::new("test", Duration::from_secs(60), 3, "limited");

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.evaluate(&policy, "ip:1.2.3.4").await;
            assert!(decision.admitted);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.limit, 3);
        }
    }

    #[tokio::test]
    async fn request_over_limit_is_denied_and_not_recorded() {
        let (limiter, _) = limiter_with_store();
        let policy = RateLimitPolicy::new("test", Duration::from_secs(60), 3, "limited");

        let start_ms = epoch_ms();
        for _ in 0..3 {
            assert!(limiter.evaluate(&policy, "ip:1.2.3.4").await.admitted);
        }

        let denied = limiter.evaluate(&policy, "ip:1.2.3.4").await;
        assert!(!denied.admitted);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_at_ms <= start_ms + 60_000 + 50);

        // the denial must not consume a slot: still denied, same count
        let denied_again = limiter.evaluate(&policy, "ip:1.2.3.4").await;
        assert!(!denied_again.admitted);
    }

    #[tokio::test]
    async fn subjects_are_counted_independently() {
        let (limiter, _) = limiter_with_store();
        let policy = RateLimitPolicy::new("test", Duration::from_secs(60), 1, "limited");

        assert!(limiter.evaluate(&policy, "ip:1.2.3.4").await.admitted);
        assert!(!limiter.evaluate(&policy, "ip:1.2.3.4").await.admitted);
        assert!(limiter.evaluate(&policy, "ip:5.6.7.8").await.admitted);
    }

    #[tokio::test]
    async fn window_elapse_readmits_a_denied_subject() {
        let (limiter, _) = limiter_with_store();
        let policy = RateLimitPolicy::new("test", Duration::from_millis(80), 2, "limited");

        assert!(limiter.evaluate(&policy, "ip:1.2.3.4").await.admitted);
        assert!(limiter.evaluate(&policy, "ip:1.2.3.4").await.admitted);
        assert!(!limiter.evaluate(&policy, "ip:1.2.3.4").await.admitted);

        tokio::time::sleep(Duration::from_millis(120)).await;

        let decision = limiter.evaluate(&policy, "ip:1.2.3.4").await;
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        let (limiter, store) = limiter_with_store();
        let policy = presets::auth();

        store.set_unavailable(true);
        let decision = limiter.evaluate(&policy, "ip:1.2.3.4").await;
        assert!(decision.admitted);
        assert_eq!(decision.limit, policy.max_requests);
        assert_eq!(decision.remaining, policy.max_requests - 1);
    }
}
