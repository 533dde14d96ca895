//! In-process [`KeyValueStore`] used when Redis is disabled or unreachable.
//!
//! Backed by a `DashMap`; per-key entry locks give the same per-key atomicity
//! the Redis pipelines provide. Expiry is lazy: stale slots are dropped when
//! touched. The availability toggle lets tests exercise outage behavior
//! (fail-open limiter, fail-to-miss cache) without a network.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{KeyValueStore, StoreError, StoreResult, WindowSnapshot};

enum Value {
    Bytes(Vec<u8>),
    Window(Vec<(i64, String)>),
    Set(HashSet<String>),
}

struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store outage. Every subsequent call fails with
    /// [`StoreError::Unavailable`] until re-enabled.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }

    fn purge_expired(&self, key: &str) {
        self.slots.remove_if(key, |_, slot| slot.is_expired());
    }
}

/// Match a Redis-style glob pattern supporting `*` only.
fn glob_match(pattern: &str, input: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == input;
    }
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !input.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    let mut rest: Vec<&str> = parts.collect();
    let tail = if pattern.ends_with('*') {
        None
    } else {
        rest.pop()
    };
    for part in rest {
        if part.is_empty() {
            continue;
        }
        match input[pos..].find(part) {
            Some(i) => pos += i + part.len(),
            None => return false,
        }
    }
    match tail {
        Some(tail) => input.len() >= pos + tail.len() && input[pos..].ends_with(tail),
        None => true,
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_available()?;
        self.purge_expired(key);
        Ok(self.slots.get(key).and_then(|slot| match &slot.value {
            Value::Bytes(bytes) => Some(bytes.clone()),
            _ => None,
        }))
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        self.check_available()?;
        self.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Bytes(value),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.check_available()?;
        let mut removed = 0;
        for key in keys {
            self.purge_expired(key);
            if self.slots.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn window_slide(
        &self,
        key: &str,
        cutoff_ms: i64,
        ttl: Duration,
    ) -> StoreResult<WindowSnapshot> {
        self.check_available()?;
        self.purge_expired(key);
        let mut snapshot = WindowSnapshot {
            count: 0,
            oldest_score_ms: None,
        };
        if let Some(mut slot) = self.slots.get_mut(key) {
            if let Value::Window(entries) = &mut slot.value {
                entries.retain(|(score, _)| *score >= cutoff_ms);
                snapshot.count = entries.len() as u64;
                snapshot.oldest_score_ms = entries.first().map(|(score, _)| *score);
                slot.expires_at = Some(Instant::now() + ttl);
            }
        }
        Ok(snapshot)
    }

    async fn window_record(
        &self,
        key: &str,
        score_ms: i64,
        member: &str,
        ttl: Duration,
    ) -> StoreResult<()> {
        self.check_available()?;
        self.purge_expired(key);
        let mut slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Window(Vec::new()),
            expires_at: None,
        });
        if let Value::Window(entries) = &mut slot.value {
            let at = entries.partition_point(|(score, _)| *score <= score_ms);
            entries.insert(at, (score_ms, member.to_string()));
        }
        slot.expires_at = Some(Instant::now() + ttl);
        Ok(())
    }

    async fn set_add(&self, key: &str, members: &[String], ttl: Duration) -> StoreResult<()> {
        self.check_available()?;
        self.purge_expired(key);
        let mut slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        if let Value::Set(set) = &mut slot.value {
            set.extend(members.iter().cloned());
        }
        slot.expires_at = Some(Instant::now() + ttl);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        self.check_available()?;
        self.purge_expired(key);
        Ok(self
            .slots
            .get(key)
            .map(|slot| match &slot.value {
                Value::Set(set) => set.iter().cloned().collect(),
                _ => Vec::new(),
            })
            .unwrap_or_default())
    }

    async fn scan_keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.check_available()?;
        Ok(self
            .slots
            .iter()
            .filter(|entry| !entry.value().is_expired() && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.check_available()?;
        self.purge_expired(key);
        Ok(self
            .slots
            .get(key)
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    async fn memory_usage(&self, key: &str) -> StoreResult<Option<u64>> {
        self.check_available()?;
        self.purge_expired(key);
        Ok(self.slots.get(key).and_then(|slot| match &slot.value {
            Value::Bytes(bytes) => Some(bytes.len() as u64),
            _ => None,
        }))
    }
}
