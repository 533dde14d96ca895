use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;

use super::key;

pub type CacheKeyFn = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;
pub type SkipFn = Arc<dyn Fn(&Request<Body>) -> bool + Send + Sync>;

/// Immutable cache configuration for one resource class.
///
/// Built once at startup; requests only read it. Only GET requests are ever
/// eligible regardless of policy.
#[derive(Clone)]
pub struct CachePolicy {
    pub name: &'static str,
    pub ttl: Duration,
    /// Request headers folded into the key so distinct header combinations
    /// never collide.
    pub vary_headers: Vec<String>,
    /// Tags attached to every entry written under this policy.
    pub tags: Vec<String>,
    key_fn: Option<CacheKeyFn>,
    skip_fn: Option<SkipFn>,
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePolicy")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("vary_headers", &self.vary_headers)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl CachePolicy {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            vary_headers: Vec::new(),
            tags: Vec::new(),
            key_fn: None,
            skip_fn: None,
        }
    }

    pub fn vary_on(mut self, headers: &[&str]) -> Self {
        self.vary_headers = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
        self
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Override the default key derivation.
    pub fn with_key_fn(
        mut self,
        f: impl Fn(&Request<Body>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_fn = Some(Arc::new(f));
        self
    }

    /// Exempt matching requests from caching (e.g. authenticated requests on a
    /// policy meant for anonymous, shareable results).
    pub fn skip_if(mut self, f: impl Fn(&Request<Body>) -> bool + Send + Sync + 'static) -> Self {
        self.skip_fn = Some(Arc::new(f));
        self
    }

    pub fn derive_key(&self, req: &Request<Body>) -> String {
        match &self.key_fn {
            Some(f) => f(req),
            None => key::default_cache_key(self, req),
        }
    }

    pub fn should_skip(&self, req: &Request<Body>) -> bool {
        self.skip_fn.as_ref().is_some_and(|f| f(req))
    }
}

/// Preset policies: generic tiers plus resource-specific classes for the
/// Hearth routes.
pub mod presets {
    use super::CachePolicy;
    use crate::config::CacheSettings;
    use crate::identity;
    use std::time::Duration;

    /// Generic short tier; its TTL comes from `cache.default_ttl_secs`.
    pub fn short(settings: &CacheSettings) -> CachePolicy {
        CachePolicy::new("short", Duration::from_secs(settings.default_ttl_secs))
    }

    pub fn medium() -> CachePolicy {
        CachePolicy::new("medium", Duration::from_secs(5 * 60))
    }

    pub fn long() -> CachePolicy {
        CachePolicy::new("long", Duration::from_secs(60 * 60))
    }

    pub fn listings() -> CachePolicy {
        CachePolicy::new("listings", Duration::from_secs(10 * 60)).tagged(&["listings"])
    }

    /// Anonymous, shareable search results only; authenticated searches are
    /// personalized and skip the cache.
    pub fn search() -> CachePolicy {
        CachePolicy::new("search", Duration::from_secs(2 * 60))
            .tagged(&["search", "listings"])
            .skip_if(|req| identity::subject(req).is_some())
    }

    pub fn profile() -> CachePolicy {
        CachePolicy::new("profile", Duration::from_secs(5 * 60))
            .tagged(&["profiles"])
            .vary_on(&["accept-language"])
    }

    pub fn admin_stats() -> CachePolicy {
        CachePolicy::new("admin_stats", Duration::from_secs(30)).tagged(&["admin"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AuthSubject;

    #[test]
    fn search_skips_authenticated_requests() {
        let policy = presets::search();
        let mut req = Request::builder()
            .uri("/api/search")
            .body(Body::empty())
            .unwrap();
        assert!(!policy.should_skip(&req));
        req.extensions_mut().insert(AuthSubject("u-1".into()));
        assert!(policy.should_skip(&req));
    }

    #[test]
    fn vary_headers_are_lowercased() {
        let policy = CachePolicy::new("t", Duration::from_secs(1)).vary_on(&["Accept-Language"]);
        assert_eq!(policy.vary_headers, vec!["accept-language".to_string()]);
    }

    #[test]
    fn short_tier_ttl_comes_from_configuration() {
        let settings = crate::config::CacheSettings {
            enabled: true,
            default_ttl_secs: 120,
        };
        assert_eq!(presets::short(&settings).ttl, Duration::from_secs(120));
    }
}
