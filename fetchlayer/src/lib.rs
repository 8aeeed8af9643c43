//! fetchlayer - asynchronous resource acquisition with deduplicated
//! preheating.
//!
//! Callers describe what they want with a [`Request`]. A [`Manager`] turns
//! requests into [`Task`]s, drives each one through a small state machine
//! and hands the work to a [`Pipeline`]: fetch, decode, transform and cache.
//! Semantically identical requests share one cached result and one
//! in-flight preheat task through the [`CacheKey`] equivalence key.
//!
//! # Architecture
//!
//! ```text
//! Manager::resume(task)
//!   │
//!   ├─ cache hit ──────────────────────────────► Completed (fast)
//!   │
//!   └─ Pipeline: fetch → decode → transform → cache write
//!                                               │
//!                                               ▼
//!                                   Completed / Cancelled
//!                                               │
//!                                               ▼
//!                                 delivery queue → listeners
//! ```
//!
//! Transport, codecs and transforms are capabilities supplied by the caller
//! through the [`Fetcher`], [`Decoder`] and [`Transform`] traits.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod key;
pub mod logging;
pub mod manager;
pub mod pipeline;
pub mod policy;
pub mod promise;
pub mod request;
pub mod scheduler;
pub mod value;

pub use cache::{CacheStats, CachedEntry, MemoryCache, MokaMemoryCache};
pub use cancel::CancellationToken;
pub use config::{ConfigError, ManagerConfig, MemoryCacheConfig};
pub use error::{LoadError, LoadResult};
pub use key::{CacheKey, DefaultEquivalence, RequestEquivalence};
pub use manager::{Manager, Progress, Response, Task, TaskId, TaskState};
pub use pipeline::{Decoder, Fetched, Fetcher, Loaded, Loader, Pipeline, ProgressSink, Transform};
pub use policy::{CachePolicy, LoadPolicy, Priority, SchedulerPolicy};
pub use promise::{Promise, Resolver};
pub use request::{Locator, Request};
pub use value::{Metadata, Value};

/// Version of the fetchlayer library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
