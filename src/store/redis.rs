//! Redis-backed [`KeyValueStore`].
//!
//! Connections come from a deadpool pool; every call is wrapped in a short
//! timeout so a stalled Redis never holds a request hostage. The sliding-window
//! operations run as atomic `MULTI`/`EXEC` pipelines, one round trip each, so
//! concurrent requests against the same key cannot lose updates.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use super::{KeyValueStore, StoreError, StoreResult, WindowSnapshot};

pub struct RedisStore {
    pool: Pool,
    op_timeout: Duration,
}

impl RedisStore {
    pub fn new(pool: Pool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }

    /// Bound a store call by the configured per-operation timeout.
    async fn run<T>(&self, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

/// Expiry in whole seconds, rounded up, never below one second.
fn ttl_secs(ttl: Duration) -> i64 {
    let mut secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs += 1;
    }
    secs.max(1) as i64
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.run(async {
            let mut conn = self.conn().await?;
            Ok(conn.get::<_, Option<Vec<u8>>>(key).await?)
        })
        .await
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        self.run(async {
            let mut conn = self.conn().await?;
            conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl) as u64)
                .await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run(async {
            let mut conn = self.conn().await?;
            Ok(conn.del::<_, u64>(keys).await?)
        })
        .await
    }

    async fn window_slide(
        &self,
        key: &str,
        cutoff_ms: i64,
        ttl: Duration,
    ) -> StoreResult<WindowSnapshot> {
        self.run(async {
            let mut conn = self.conn().await?;
            // exclusive bound: a member aged exactly the window length still counts
            let (count, oldest): (u64, Vec<(String, f64)>) = redis::pipe()
                .atomic()
                .zrembyscore(key, "-inf", format!("({cutoff_ms}"))
                .ignore()
                .zcard(key)
                .expire(key, ttl_secs(ttl))
                .ignore()
                .zrange_withscores(key, 0, 0)
                .query_async(&mut conn)
                .await?;
            Ok(WindowSnapshot {
                count,
                oldest_score_ms: oldest.first().map(|(_, score)| *score as i64),
            })
        })
        .await
    }

    async fn window_record(
        &self,
        key: &str,
        score_ms: i64,
        member: &str,
        ttl: Duration,
    ) -> StoreResult<()> {
        self.run(async {
            let mut conn = self.conn().await?;
            redis::pipe()
                .atomic()
                .zadd(key, member, score_ms)
                .ignore()
                .expire(key, ttl_secs(ttl))
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn set_add(&self, key: &str, members: &[String], ttl: Duration) -> StoreResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        self.run(async {
            let mut conn = self.conn().await?;
            redis::pipe()
                .atomic()
                .sadd(key, members)
                .ignore()
                .expire(key, ttl_secs(ttl))
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        self.run(async {
            let mut conn = self.conn().await?;
            Ok(conn.smembers::<_, Vec<String>>(key).await?)
        })
        .await
    }

    async fn scan_keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.run(async {
            let mut conn = self.conn().await?;
            Ok(conn.keys::<_, Vec<String>>(pattern).await?)
        })
        .await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.run(async {
            let mut conn = self.conn().await?;
            let secs = conn.ttl::<_, i64>(key).await?;
            // -1 means no expiry, -2 means missing key
            Ok((secs > 0).then(|| Duration::from_secs(secs as u64)))
        })
        .await
    }

    async fn memory_usage(&self, key: &str) -> StoreResult<Option<u64>> {
        self.run(async {
            let mut conn = self.conn().await?;
            match redis::cmd("MEMORY")
                .arg("USAGE")
                .arg(key)
                .query_async::<Option<u64>>(&mut conn)
                .await
            {
                Ok(bytes) => Ok(bytes),
                Err(e) => {
                    // MEMORY USAGE can be disabled; the caller falls back to an estimate
                    tracing::debug!(key = %key, error = %e, "MEMORY USAGE not available");
                    Ok(None)
                }
            }
        })
        .await
    }
}
