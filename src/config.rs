use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::GatewayError;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::load`]; invalid configuration is
/// fatal there and never a runtime condition.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

impl GatewayConfig {
    /// Load configuration from an optional TOML file plus `HEARTH__`-prefixed
    /// environment overrides (e.g. `HEARTH__REDIS__URL`).
    pub fn load(path: Option<&str>) -> Result<Self, GatewayError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("HEARTH")
                .separator("__")
                .try_parsing(true),
        );
        let cfg: GatewayConfig = builder
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        cfg.validate().map_err(GatewayError::Configuration)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.redis.enabled && self.redis.url.is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        if self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        if self.redis.timeout_ms == 0 {
            return Err("redis.timeout_ms must be > 0".into());
        }
        if self.cache.default_ttl_secs == 0 {
            return Err("cache.default_ttl_secs must be > 0".into());
        }
        Ok(())
    }
}

/// Redis connection settings. The gateway degrades to an in-process store when
/// Redis is disabled or unreachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Connection URL, e.g. "redis://localhost:6379"
    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Per-call timeout in milliseconds; also used for pool create/wait.
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    2000
}

impl RedisConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

/// Kill switch for the rate-limit middleware; a disabled limiter stays in the
/// router but passes everything through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Kill switch and default TTL for the response cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// TTL of the generic "short" cache tier.
    #[serde(default = "default_cache_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    60
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_ttl_secs: default_cache_ttl_secs(),
        }
    }
}
