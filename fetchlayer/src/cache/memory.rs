//! In-memory cache with cost-weighted eviction using moka.
//!
//! This provider wraps `moka::sync::Cache`. Moka uses lock-free data
//! structures for reads and bounded, concurrent writes, so it is safe to call
//! from the manager's critical section and from pipeline workers alike.
//!
//! # Why moka?
//!
//! - Lock-free reads (common case)
//! - Concurrent writes without blocking
//! - Automatic eviction bounded by total entry cost
//! - Optional time-to-live per entry

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;

use crate::cache::traits::{CachedEntry, MemoryCache};
use crate::config::MemoryCacheConfig;
use crate::key::CacheKey;

/// Point-in-time cache statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Number of entries.
    pub entry_count: u64,
    /// Sum of entry costs.
    pub weighted_size: u64,
}

impl CacheStats {
    /// Returns the hit ratio (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Memory cache backed by moka.
pub struct MokaMemoryCache {
    /// The underlying moka cache.
    cache: Cache<CacheKey, CachedEntry>,
    /// Maximum total cost.
    max_cost: u64,
    /// Statistics, updated with relaxed atomics.
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MokaMemoryCache {
    /// Create a cache bounded by total entry cost.
    ///
    /// # Arguments
    ///
    /// * `max_cost` - Maximum sum of [`Value::cost`](crate::value::Value::cost)
    /// * `ttl` - Optional time-to-live for entries
    pub fn new(max_cost: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder()
            // Weight each entry by its cost
            .weigher(|_key: &CacheKey, entry: &CachedEntry| -> u32 {
                // moka uses u32 for weights, cap at u32::MAX for very large entries
                entry.cost().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_cost);

        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            cache: builder.build(),
            max_cost,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache from configuration.
    pub fn from_config(config: &MemoryCacheConfig) -> Self {
        Self::new(config.max_cost, config.ttl)
    }

    /// Get the current number of entries.
    ///
    /// Moka updates counts lazily; call [`Self::run_pending_tasks`] first for
    /// an exact figure.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Get the current total cost of all entries.
    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }

    /// Get the configured maximum total cost.
    pub fn max_cost(&self) -> u64 {
        self.max_cost
    }

    /// Run pending maintenance (eviction, expiry).
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.cache.entry_count(),
            weighted_size: self.cache.weighted_size(),
        }
    }
}

impl MemoryCache for MokaMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CachedEntry> {
        match self.cache.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: CacheKey, entry: CachedEntry) {
        self.cache.insert(key, entry);
    }

    fn remove(&self, key: &CacheKey) {
        self.cache.invalidate(key);
    }

    fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }
}
