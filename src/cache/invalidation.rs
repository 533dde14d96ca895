use std::sync::Arc;

use crate::metrics;
use crate::store::KeyValueStore;

/// Size assumed per entry when the store cannot report per-key memory usage.
const FALLBACK_ENTRY_BYTES: u64 = 2048;

/// Operational cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub approx_bytes: u64,
}

/// Administrative surface for cache invalidation and stats.
///
/// Called by data-mutating business operations (a listing update invalidates
/// its cached reads) and by test teardown. Every store error is logged and
/// degrades to a no-op; invalidation never fails a caller.
pub struct CacheManager {
    store: Arc<dyn KeyValueStore>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Delete every key matching a glob pattern. Returns how many were
    /// removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        let keys = match self.store.scan_keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "cache pattern scan failed");
                metrics::record_store_failure("scan_keys");
                return 0;
            }
        };
        self.delete_keys(&keys).await
    }

    /// Delete every entry written under any of the given tags, along with the
    /// per-key tag records and the tag indices themselves.
    ///
    /// Index members whose entry already expired are deleted as no-ops; the
    /// store-enforced TTL reconciles the index over time either way.
    pub async fn invalidate_tags(&self, tags: &[&str]) -> u64 {
        let mut removed = 0;
        for tag in tags {
            let index_key = format!("tag_index:{tag}");
            let members = match self.store.set_members(&index_key).await {
                Ok(members) => members,
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "tag index read failed");
                    metrics::record_store_failure("set_members");
                    continue;
                }
            };
            let mut keys: Vec<String> = Vec::with_capacity(members.len() * 2 + 1);
            for member in &members {
                keys.push(member.clone());
                keys.push(format!("{member}:tags"));
            }
            keys.push(index_key);
            removed += self.delete_keys(&keys).await;
            tracing::debug!(tag = %tag, entries = members.len(), "tag invalidated");
        }
        removed
    }

    /// Drop the entire cache namespace across all policies, including tag
    /// indices. Used for administrative resets and test teardown.
    pub async fn invalidate_all(&self) -> u64 {
        self.invalidate_pattern("cache:*").await + self.invalidate_pattern("tag_index:*").await
    }

    /// Invalidate everything cached for one listing: its own entries plus the
    /// search results that may embed it.
    pub async fn invalidate_listing(&self, listing_id: &str) -> u64 {
        self.invalidate_pattern(&format!("cache:GET:/api/listings/{listing_id}*"))
            .await
            + self.invalidate_tags(&["search"]).await
    }

    /// Key count and approximate aggregate size of the cache namespace.
    pub async fn stats(&self) -> CacheStats {
        let keys = match self.store.scan_keys("cache:*").await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "cache stats scan failed");
                metrics::record_store_failure("scan_keys");
                return CacheStats {
                    entries: 0,
                    approx_bytes: 0,
                };
            }
        };

        let mut entries = 0;
        let mut approx_bytes = 0;
        for key in &keys {
            if key.ends_with(":tags") {
                continue;
            }
            entries += 1;
            approx_bytes += match self.store.memory_usage(key).await {
                Ok(Some(bytes)) => bytes,
                _ => FALLBACK_ENTRY_BYTES,
            };
        }

        metrics::set_cache_entries(entries);
        CacheStats {
            entries,
            approx_bytes,
        }
    }

    async fn delete_keys(&self, keys: &[String]) -> u64 {
        if keys.is_empty() {
            return 0;
        }
        match self.store.delete(keys).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, "cache delete failed");
                metrics::record_store_failure("delete");
                0
            }
        }
    }
}
