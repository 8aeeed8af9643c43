//! Memory cache capability.
//!
//! The core only needs four operations from a cache (get, set, remove,
//! clear) keyed by [`CacheKey`](crate::key::CacheKey). Eviction and expiry
//! belong to the implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐        ┌────────────────────┐
//! │      Manager       │        │   Loader (stage 1  │
//! │  cache short-cut   │        │   and stage 5)     │
//! └─────────┬──────────┘        └─────────┬──────────┘
//!           │                             │
//!           ▼                             ▼
//! ┌─────────────────────────────────────────────────┐
//! │             Arc<dyn MemoryCache>                │
//! │                                                 │
//! │  CacheKey → CachedEntry { value, metadata }     │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! [`MokaMemoryCache`] is the provided implementation.

mod memory;
mod traits;

pub use memory::{CacheStats, MokaMemoryCache};
pub use traits::{CachedEntry, MemoryCache};
