use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;

use crate::identity;

pub type KeyFn = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;
pub type SkipFn = Arc<dyn Fn(&Request<Body>) -> bool + Send + Sync>;
pub type LimitReachedFn = Arc<dyn Fn(&Request<Body>, &str) + Send + Sync>;

/// Immutable rate-limit configuration for one route group.
///
/// Constructed once at startup and shared by reference across all requests;
/// nothing on the policy mutates after construction.
#[derive(Clone)]
pub struct RateLimitPolicy {
    /// Scope label used in storage keys (`rate_limit:<scope>:<id>`).
    pub scope: &'static str,
    pub window: Duration,
    pub max_requests: u32,
    /// User-facing message carried by the 429 body.
    pub message: String,
    key_fn: Option<KeyFn>,
    skip_fn: Option<SkipFn>,
    on_limit_reached: Option<LimitReachedFn>,
}

impl fmt::Debug for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitPolicy")
            .field("scope", &self.scope)
            .field("window", &self.window)
            .field("max_requests", &self.max_requests)
            .finish_non_exhaustive()
    }
}

impl RateLimitPolicy {
    pub fn new(scope: &'static str, window: Duration, max_requests: u32, message: &str) -> Self {
        Self {
            scope,
            window,
            max_requests,
            message: message.to_string(),
            key_fn: None,
            skip_fn: None,
            on_limit_reached: None,
        }
    }

    /// Override the default subject derivation (principal id, else client
    /// address).
    pub fn with_key_fn(
        mut self,
        f: impl Fn(&Request<Body>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_fn = Some(Arc::new(f));
        self
    }

    /// Exempt matching requests from this policy entirely.
    pub fn skip_if(mut self, f: impl Fn(&Request<Body>) -> bool + Send + Sync + 'static) -> Self {
        self.skip_fn = Some(Arc::new(f));
        self
    }

    /// Side-effect hook fired when a request is denied (auditing).
    pub fn on_limit_reached(
        mut self,
        f: impl Fn(&Request<Body>, &str) + Send + Sync + 'static,
    ) -> Self {
        self.on_limit_reached = Some(Arc::new(f));
        self
    }

    pub fn derive_subject(&self, req: &Request<Body>) -> String {
        match &self.key_fn {
            Some(f) => f(req),
            None => identity::rate_limit_subject(req),
        }
    }

    pub fn should_skip(&self, req: &Request<Body>) -> bool {
        self.skip_fn.as_ref().is_some_and(|f| f(req))
    }

    pub fn notify_limit_reached(&self, req: &Request<Body>, subject: &str) {
        if let Some(hook) = &self.on_limit_reached {
            hook(req, subject);
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }

    pub fn storage_key(&self, subject: &str) -> String {
        format!("rate_limit:{}:{}", self.scope, subject)
    }
}

/// Preset policies for the Hearth route groups. Parameters differ; the
/// algorithm is shared.
pub mod presets {
    use super::RateLimitPolicy;
    use std::time::Duration;

    pub fn general() -> RateLimitPolicy {
        RateLimitPolicy::new(
            "general",
            Duration::from_secs(15 * 60),
            100,
            "Too many requests, please try again later",
        )
    }

    pub fn auth() -> RateLimitPolicy {
        RateLimitPolicy::new(
            "auth",
            Duration::from_secs(15 * 60),
            5,
            "Too many authentication attempts, please try again later",
        )
    }

    pub fn password_reset() -> RateLimitPolicy {
        RateLimitPolicy::new(
            "password_reset",
            Duration::from_secs(60 * 60),
            3,
            "Too many password reset requests, please try again later",
        )
    }

    pub fn upload() -> RateLimitPolicy {
        RateLimitPolicy::new(
            "upload",
            Duration::from_secs(60 * 60),
            20,
            "Upload limit reached, please try again later",
        )
    }

    pub fn search() -> RateLimitPolicy {
        RateLimitPolicy::new(
            "search",
            Duration::from_secs(60),
            30,
            "Too many search requests, please slow down",
        )
    }

    pub fn messaging() -> RateLimitPolicy {
        RateLimitPolicy::new(
            "messaging",
            Duration::from_secs(60),
            20,
            "Too many messages sent, please slow down",
        )
    }

    pub fn admin() -> RateLimitPolicy {
        RateLimitPolicy::new(
            "admin",
            Duration::from_secs(5 * 60),
            50,
            "Too many admin requests, please try again later",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AuthSubject;

    fn request() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[test]
    fn storage_key_includes_scope_and_subject() {
        let policy = presets::general();
        assert_eq!(
            policy.storage_key("ip:1.2.3.4"),
            "rate_limit:general:ip:1.2.3.4"
        );
    }

    #[test]
    fn custom_key_fn_overrides_default() {
        let policy = presets::search().with_key_fn(|_| "tenant:42".to_string());
        assert_eq!(policy.derive_subject(&request()), "tenant:42");
    }

    #[test]
    fn skip_condition_applies() {
        let policy =
            presets::general().skip_if(|req| req.extensions().get::<AuthSubject>().is_some());
        let mut req = request();
        assert!(!policy.should_skip(&req));
        req.extensions_mut().insert(AuthSubject("u-1".into()));
        assert!(policy.should_skip(&req));
    }
}
