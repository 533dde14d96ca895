//! Key-value store abstraction shared by the rate limiter and the response cache.
//!
//! All shared mutable state lives behind this trait; the gateway itself holds no
//! cross-request state. Two backends exist:
//!
//! - [`RedisStore`]: deadpool-redis pool, multi-instance deployments
//! - [`MemoryStore`]: DashMap, single-instance fallback and tests
//!
//! ## Graceful Degradation
//!
//! Every caller treats a `StoreError` as "the layer is absent": the limiter
//! fails open and the cache falls back to a miss. Errors are logged here or at
//! the call site, never surfaced to the client.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors produced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("store command failed: {0}")]
    Command(#[from] ::redis::RedisError),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store is unavailable")]
    Unavailable,
}

/// Convenience result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Snapshot of a rate-limit window after expired entries were purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Number of entries still inside the window.
    pub count: u64,
    /// Score (epoch milliseconds) of the oldest surviving entry, if any.
    pub oldest_score_ms: Option<i64>,
}

/// Shared, process-external key-value store.
///
/// The sorted-set operations back the sliding-window limiter; plain byte and
/// set operations back the response cache and its tag index. The two window
/// methods must each execute atomically against concurrent callers of the same
/// key (the Redis backend uses a single `MULTI`/`EXEC` pipeline per call).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch raw bytes stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store raw bytes under `key` with an expiry.
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()>;

    /// Delete the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    /// Drop sorted-set members with score strictly below `cutoff_ms`, refresh
    /// the key TTL, and report the surviving count plus the oldest surviving
    /// score.
    async fn window_slide(
        &self,
        key: &str,
        cutoff_ms: i64,
        ttl: Duration,
    ) -> StoreResult<WindowSnapshot>;

    /// Append one member to a window's sorted set and refresh the key TTL.
    async fn window_record(
        &self,
        key: &str,
        score_ms: i64,
        member: &str,
        ttl: Duration,
    ) -> StoreResult<()>;

    /// Add members to a set and refresh the key TTL.
    async fn set_add(&self, key: &str, members: &[String], ttl: Duration) -> StoreResult<()>;

    /// List all members of a set. Missing keys yield an empty list.
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Enumerate keys matching a glob pattern.
    async fn scan_keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Remaining time-to-live for `key`, if the key exists and has one.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Approximate bytes used by `key`, when the backend can report it.
    async fn memory_usage(&self, key: &str) -> StoreResult<Option<u64>>;
}
