//! Core trait for the memory cache capability.
//!
//! # Design Principles
//!
//! - **Equivalence keys**: Entries are stored under [`CacheKey`], so requests
//!   the pipeline judges equivalent share one entry
//! - **Synchronous**: The manager consults the cache while it holds its
//!   state lock, so lookups must not await
//! - **Minimal interface**: Only essential operations; eviction, expiry and
//!   sizing are the provider's concern
//! - **Last writer wins**: No ordering guarantees beyond that

use crate::key::CacheKey;
use crate::value::{Metadata, Value};

/// A cached value with its auxiliary metadata.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    /// The produced value.
    pub value: Value,
    /// Metadata recorded when the value was produced.
    pub metadata: Metadata,
}

impl CachedEntry {
    /// Creates an entry.
    pub fn new(value: Value, metadata: Metadata) -> Self {
        Self { value, metadata }
    }

    /// Weight of the entry for size-bounded caches.
    pub fn cost(&self) -> usize {
        self.value.cost()
    }
}

/// In-memory storage of produced values.
///
/// All implementations must be `Send + Sync`; the manager and pipeline stages
/// call them from arbitrary threads.
pub trait MemoryCache: Send + Sync {
    /// Returns the entry stored under `key`.
    fn get(&self, key: &CacheKey) -> Option<CachedEntry>;

    /// Stores `entry` under `key`, replacing any previous entry.
    fn set(&self, key: CacheKey, entry: CachedEntry);

    /// Removes the entry stored under `key`.
    fn remove(&self, key: &CacheKey);

    /// Removes every entry.
    fn clear(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_entry_cost_follows_value() {
        let entry = CachedEntry::new(Value::with_cost(vec![0u8; 10], 10), Metadata::new());
        assert_eq!(entry.cost(), 10);
    }
}
