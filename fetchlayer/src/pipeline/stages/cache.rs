//! Cache stages - read before fetching, write after transforming.
//!
//! Both stages consult the request's policies: a read only happens when the
//! request permits reading and does not ask to reload, a write only when the
//! request permits writing.

use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::cache::{CachedEntry, MemoryCache};
use crate::key::CacheKey;
use crate::pipeline::Loaded;
use crate::request::Request;

/// Checks if a request's result is in the memory cache.
///
/// This is called before the fetch stage to short-circuit on a cache hit.
///
/// # Returns
///
/// The cached value marked `from_cache`, or `None` on a miss or when the
/// request does not read the cache.
pub fn check_memory_cache(
    request: &Request,
    key: &CacheKey,
    memory_cache: &dyn MemoryCache,
) -> Option<Loaded> {
    if !request.reads_cache() {
        trace!(locator = %request.locator(), "Cache read skipped by policy");
        return None;
    }

    let entry = memory_cache.get(key)?;
    debug!(
        locator = %request.locator(),
        cost = entry.cost(),
        "Memory cache hit"
    );
    Some(Loaded {
        value: entry.value,
        metadata: entry.metadata,
        from_cache: true,
    })
}

/// Stores a produced value in the memory cache.
///
/// # Note
///
/// This function never fails. Writes are skipped when the request does not
/// permit them.
#[instrument(skip_all, fields(locator = %request.locator()))]
pub fn cache_stage(
    request: &Request,
    key: CacheKey,
    loaded: &Loaded,
    memory_cache: Arc<dyn MemoryCache>,
) {
    if !request.writes_cache() {
        trace!("Cache write skipped by policy");
        return;
    }

    let entry = CachedEntry::new(loaded.value.clone(), loaded.metadata.clone());
    let cost = entry.cost();
    memory_cache.set(key, entry);

    debug!(cost, "Cache stage complete");
}
