//! Request-pipeline infrastructure for the Hearth rental API: a sliding-window
//! rate limiter and a tag-addressable response cache, both backed by a shared
//! key-value store.
//!
//! Both layers mount as axum middleware and degrade gracefully. A store outage
//! never fails a request: the limiter admits, the cache misses.
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{Router, middleware, routing::get};
//! use hearth_gateway::cache::{ResponseCacheState, policy_presets, response_cache};
//! use hearth_gateway::config::GatewayConfig;
//! use hearth_gateway::rate_limit::{RateLimitState, limit_presets, rate_limit};
//!
//! # async fn build() -> Result<Router, hearth_gateway::error::GatewayError> {
//! let config = GatewayConfig::load(None)?;
//! let store = hearth_gateway::create_store(&config.redis).await;
//!
//! let app = Router::new()
//!     .route("/api/listings", get(|| async { "[]" }))
//!     .layer(middleware::from_fn_with_state(
//!         ResponseCacheState::new(policy_presets::listings(), store.clone()),
//!         response_cache,
//!     ))
//!     .layer(middleware::from_fn_with_state(
//!         RateLimitState::new(limit_presets::general(), store.clone()),
//!         rate_limit,
//!     ));
//! # Ok(app)
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod observability;
pub mod rate_limit;
pub mod store;

use std::sync::Arc;

use crate::config::RedisConfig;
use crate::store::{KeyValueStore, MemoryStore, RedisStore};

pub use crate::cache::{CacheManager, CachePolicy, ResponseCacheState, response_cache};
pub use crate::config::GatewayConfig;
pub use crate::error::GatewayError;
pub use crate::rate_limit::{RateLimitPolicy, RateLimitState, rate_limit};

/// Build the shared store from configuration.
///
/// Redis is probed once at startup; if it is disabled or unreachable the
/// gateway falls back to the in-process store rather than refusing to boot.
/// The fallback loses cross-instance coordination, which is the accepted
/// trade-off for staying up.
pub async fn create_store(config: &RedisConfig) -> Arc<dyn KeyValueStore> {
    if !config.enabled {
        tracing::info!("redis disabled; using in-process store");
        return Arc::new(MemoryStore::new());
    }

    let mut pool_config = deadpool_redis::Config::from_url(&config.url);
    let mut sizing = deadpool_redis::PoolConfig::new(config.pool_size);
    sizing.timeouts.create = Some(config.op_timeout());
    sizing.timeouts.wait = Some(config.op_timeout());
    pool_config.pool = Some(sizing);

    let pool = match pool_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "failed to build redis pool; using in-process store");
            return Arc::new(MemoryStore::new());
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!(url = %config.url, pool_size = config.pool_size, "redis store ready");
            Arc::new(RedisStore::new(pool, config.op_timeout()))
        }
        Err(e) => {
            tracing::warn!(error = %e, "redis unreachable; using in-process store");
            Arc::new(MemoryStore::new())
        }
    }
}
