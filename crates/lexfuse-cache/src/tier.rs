//! A bounded map with per-entry TTL and least-recently-used eviction.
//!
//! Storage and LRU eviction come from `moka`. Expiry is checked against the
//! injected [`Clock`] on every read, so TTLs follow the same time source as
//! session inactivity and can be driven by a manual clock in tests.

use chrono::{DateTime, Utc};
use lexfuse_core::clock::has_elapsed;
use lexfuse_core::Clock;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::key::CacheKey;

/// Why a lookup missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No entry under the key.
    Absent,
    /// The entry outlived its TTL and was dropped.
    Expired,
}

/// Outcome of a cache lookup. A miss is a normal result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<V> {
    /// Stored value.
    Hit(V),
    /// Nothing usable.
    Miss(MissReason),
}

impl<V> CacheLookup<V> {
    /// The value, if this was a hit.
    pub fn hit(self) -> Option<V> {
        match self {
            Self::Hit(v) => Some(v),
            Self::Miss(_) => None,
        }
    }

    /// Whether this was a hit.
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Counters for one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently held.
    pub entries: usize,
    /// Maximum entries.
    pub capacity: usize,
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries dropped because their TTL ran out.
    pub expirations: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
}

#[derive(Clone)]
struct Entry<V> {
    value: V,
    stored_at: DateTime<Utc>,
    ttl: Duration,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

/// One cache tier.
///
/// Safe to share between request handlers and a background sweep.
pub struct CacheTier<V> {
    name: &'static str,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cache: Cache<CacheKey, Entry<V>>,
    counters: Arc<Counters>,
}

impl<V: Clone + Send + Sync + 'static> CacheTier<V> {
    /// Create a tier holding at most `capacity` entries (minimum 1), each
    /// living for `ttl` unless set with an explicit TTL.
    pub fn new(name: &'static str, capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        let counters = Arc::new(Counters::default());
        let on_evict = Arc::clone(&counters);
        let cache = Cache::builder()
            .name(name)
            .max_capacity(capacity as u64)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |_key, _value, cause| {
                if cause == RemovalCause::Size {
                    on_evict.evictions.fetch_add(1, Ordering::Relaxed);
                    trace!(tier = name, "evicted least recently used entry");
                }
            })
            .build();
        Self {
            name,
            capacity,
            ttl,
            clock,
            cache,
            counters,
        }
    }

    /// Tier name, used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Default TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `key`, refreshing its recency on a hit.
    pub fn get(&self, key: &CacheKey) -> CacheLookup<V> {
        let Some(entry) = self.cache.get(key) else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::Miss(MissReason::Absent);
        };
        if has_elapsed(entry.stored_at, self.clock.now(), entry.ttl) {
            self.cache.invalidate(key);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            trace!(tier = self.name, "entry expired on access");
            return CacheLookup::Miss(MissReason::Expired);
        }
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        CacheLookup::Hit(entry.value)
    }

    /// Store `value` under `key` with the tier's TTL, replacing any previous entry.
    pub fn set(&self, key: CacheKey, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    /// Store `value` under `key` with an explicit TTL.
    pub fn set_with_ttl(&self, key: CacheKey, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            stored_at: self.clock.now(),
            ttl,
        };
        self.cache.insert(key, entry);
        // Apply pending evictions now so the tier never holds more than
        // `capacity` entries between writes.
        self.cache.run_pending_tasks();
    }

    /// Drop one entry. Returns whether it existed.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.cache.remove(key).is_some()
    }

    /// Drop every entry whose key matches `pred`. Returns how many were dropped.
    pub fn remove_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&CacheKey) -> bool,
    {
        let doomed: Vec<Arc<CacheKey>> = self
            .cache
            .iter()
            .filter(|(k, _)| pred(k.as_ref()))
            .map(|(k, _)| k)
            .collect();
        self.remove_all(&doomed)
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let doomed: Vec<Arc<CacheKey>> = self
            .cache
            .iter()
            .filter(|(_, e)| has_elapsed(e.stored_at, now, e.ttl))
            .map(|(k, _)| k)
            .collect();
        let dropped = self.remove_all(&doomed);
        self.counters
            .expirations
            .fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    /// Drop everything. Returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let n = self.len();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        n
    }

    /// Entries currently held (expired ones included until touched or purged).
    pub fn len(&self) -> usize {
        self.cache.run_pending_tasks();
        usize::try_from(self.cache.entry_count()).unwrap_or(usize::MAX)
    }

    /// Whether the tier holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_all(&self, keys: &[Arc<CacheKey>]) -> usize {
        keys.iter()
            .filter(|key| {
                let key: &CacheKey = key;
                self.cache.remove(key).is_some()
            })
            .count()
    }

    /// Counters snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}
