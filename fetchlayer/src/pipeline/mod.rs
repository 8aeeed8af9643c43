//! Multi-stage acquisition pipeline.
//!
//! A request flows through five stages:
//!
//! ```text
//! cache read ──hit──────────────────────────────────────────► Loaded
//!     │ miss
//!     ▼
//!   fetch ──► decode (decode scheduler) ──► transform (transform scheduler)
//!                                                   │
//!                                                   ▼
//!                                              cache write ──► Loaded
//! ```
//!
//! Any failure or cancellation short-circuits every later stage. The
//! cancellation token is checked between stages; work already running is
//! not interrupted.
//!
//! The [`Pipeline`] trait is what the [`Manager`](crate::manager::Manager)
//! depends on. [`Loader`] is the standard implementation.

mod loader;
pub mod stages;
mod traits;

pub use loader::Loader;
pub use traits::{Decoder, Fetched, Fetcher, Transform};

use std::fmt;
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::key::{CacheKey, RequestEquivalence};
use crate::promise::Promise;
use crate::request::Request;
use crate::value::{Metadata, Value};

/// Result of a successful load.
#[derive(Clone, Debug)]
pub struct Loaded {
    /// The produced value.
    pub value: Value,
    /// Metadata recorded with the value.
    pub metadata: Metadata,
    /// True if the value came from the memory cache.
    pub from_cache: bool,
}

/// Callback receiving `(completed, total)` progress counts.
///
/// Cloning shares the underlying callback.
#[derive(Clone)]
pub struct ProgressSink {
    callback: Option<Arc<dyn Fn(u64, u64) + Send + Sync>>,
}

impl ProgressSink {
    /// Creates a sink that forwards to `callback`.
    pub fn new(callback: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Creates a sink that discards every report.
    pub fn noop() -> Self {
        Self { callback: None }
    }

    /// Reports progress.
    pub fn report(&self, completed: u64, total: u64) {
        if let Some(callback) = &self.callback {
            callback(completed, total);
        }
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("active", &self.callback.is_some())
            .finish()
    }
}

/// Produces values for requests.
pub trait Pipeline: Send + Sync {
    /// Starts loading `request`.
    ///
    /// The returned promise settles exactly once. It settles with
    /// [`LoadError::Cancelled`](crate::LoadError::Cancelled) if `token` is
    /// cancelled before the pipeline finishes.
    ///
    /// The cache read happens here: on a hit the promise is already settled
    /// when `load` returns, with `from_cache` set. The manager relies on
    /// this to complete cached tasks synchronously.
    fn load(&self, request: &Request, token: CancellationToken, progress: ProgressSink)
        -> Promise<Loaded>;

    /// Returns a cached result for `request` without starting any work.
    ///
    /// Implementations must honor the request's cache and load policies.
    fn cached(&self, request: &Request) -> Option<Loaded>;

    /// Strategy deciding which requests share results.
    fn equivalence(&self) -> Arc<dyn RequestEquivalence>;

    /// Builds the equivalence key for `request`.
    fn cache_key(&self, request: &Request) -> CacheKey {
        CacheKey::new(request, self.equivalence())
    }
}
