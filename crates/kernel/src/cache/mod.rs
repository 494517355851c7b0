//! Generic in-process expiring cache.
//!
//! Backs the live-limiter cache and the tenant tier cache. Entries carry a
//! per-entry TTL; expiry is evaluated lazily on access (expired entries are
//! dropped when touched), with [`ExpiringCache::purge_expired`] available
//! for an explicit sweep. No background eviction thread is required.
//!
//! Two expiry modes:
//! - absolute: an entry lives `ttl` past its creation, regardless of reads
//! - sliding: every access pushes expiry out by the entry's TTL (idle TTL)

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::clock::Clock;

struct CacheEntry<V> {
    value: V,
    ttl_ms: u64,
    expires_at_ms: u64,
}

/// Concurrent TTL cache keyed by `K`.
///
/// Values are cloned out on read, so `V` is typically an `Arc` or a small
/// `Copy` type. All operations are safe under concurrent access from many
/// request-handling tasks.
pub struct ExpiringCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
    sliding: bool,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache with absolute per-entry expiry.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            sliding: false,
        }
    }

    /// Create a cache whose entries expire only after sitting idle for
    /// their TTL; every read refreshes the expiry.
    pub fn with_sliding_expiry(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            sliding: true,
        }
    }

    /// Fetch the value for `key`, constructing it with `factory` on miss
    /// (or when the cached entry has expired).
    ///
    /// Concurrent first accesses for the same key collapse into a single
    /// `factory` call: the map shard stays locked while the factory runs,
    /// so late arrivals see the constructed value instead of building their
    /// own. The factory must not re-enter this cache.
    pub fn get_or_create(&self, key: K, ttl: Duration, factory: impl FnOnce() -> V) -> V {
        let now = self.clock.now_ms();
        let ttl_ms = ttl.as_millis() as u64;

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.expires_at_ms <= now {
                    *entry = CacheEntry {
                        value: factory(),
                        ttl_ms,
                        expires_at_ms: now + ttl_ms,
                    };
                } else if self.sliding {
                    entry.expires_at_ms = now + entry.ttl_ms;
                }
                entry.value.clone()
            }
            Entry::Vacant(vacant) => {
                let value = factory();
                vacant.insert(CacheEntry {
                    value: value.clone(),
                    ttl_ms,
                    expires_at_ms: now + ttl_ms,
                });
                value
            }
        }
    }

    /// Fetch the value for `key` if present and not expired.
    pub fn try_get(&self, key: &K) -> Option<V> {
        let now = self.clock.now_ms();

        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.expires_at_ms > now {
                if self.sliding {
                    entry.expires_at_ms = now + entry.ttl_ms;
                }
                return Some(entry.value.clone());
            }
        }

        // Expired: drop it so the map does not accumulate dead entries.
        self.entries
            .remove_if(key, |_, entry| entry.expires_at_ms <= now);
        None
    }

    /// Insert or replace the value for `key` with the given TTL.
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let now = self.clock.now_ms();
        let ttl_ms = ttl.as_millis() as u64;
        self.entries.insert(
            key,
            CacheEntry {
                value,
                ttl_ms,
                expires_at_ms: now + ttl_ms,
            },
        );
    }

    /// Remove the entry for `key`, if any.
    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = self.clock.now_ms();
        self.entries.retain(|_, entry| entry.expires_at_ms > now);
    }

    /// Number of entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V> std::fmt::Debug for ExpiringCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("entries", &self.entries.len())
            .field("sliding", &self.sliding)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clock::ManualClock;

    fn cache_with_clock(sliding: bool) -> (ExpiringCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let cache = if sliding {
            ExpiringCache::with_sliding_expiry(clock.clone())
        } else {
            ExpiringCache::new(clock.clone())
        };
        (cache, clock)
    }

    #[test]
    fn absolute_ttl_expires_without_refresh_on_read() {
        let (cache, clock) = cache_with_clock(false);
        cache.insert("a".to_string(), 1, Duration::from_secs(10));

        clock.advance(Duration::from_secs(9));
        assert_eq!(cache.try_get(&"a".to_string()), Some(1));

        // Reads did not extend the lifetime.
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.try_get(&"a".to_string()), None);
    }

    #[test]
    fn sliding_ttl_refreshes_on_access() {
        let (cache, clock) = cache_with_clock(true);
        cache.insert("a".to_string(), 1, Duration::from_secs(10));

        for _ in 0..5 {
            clock.advance(Duration::from_secs(8));
            assert_eq!(cache.try_get(&"a".to_string()), Some(1));
        }

        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.try_get(&"a".to_string()), None);
    }

    #[test]
    fn get_or_create_rebuilds_expired_entries() {
        let (cache, clock) = cache_with_clock(true);
        let first = cache.get_or_create("k".to_string(), Duration::from_secs(5), || 1);
        assert_eq!(first, 1);

        // Within the TTL the cached value wins over the factory.
        clock.advance(Duration::from_secs(4));
        let cached = cache.get_or_create("k".to_string(), Duration::from_secs(5), || 2);
        assert_eq!(cached, 1);

        clock.advance(Duration::from_secs(6));
        let rebuilt = cache.get_or_create("k".to_string(), Duration::from_secs(5), || 3);
        assert_eq!(rebuilt, 3);
    }

    #[test]
    fn concurrent_first_access_constructs_once() {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(0));
        let cache: Arc<ExpiringCache<String, u32>> =
            Arc::new(ExpiringCache::with_sliding_expiry(clock));
        let calls = Arc::new(AtomicUsize::new(0));

        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_create("tenant_acme".to_string(), Duration::from_secs(60), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        7
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn purge_drops_only_expired_entries() {
        let (cache, clock) = cache_with_clock(false);
        cache.insert("old".to_string(), 1, Duration::from_secs(5));
        cache.insert("new".to_string(), 2, Duration::from_secs(60));

        clock.advance(Duration::from_secs(10));
        cache.purge_expired();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.try_get(&"new".to_string()), Some(2));
    }
}
