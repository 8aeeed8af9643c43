//! Execution policies for pipeline stages.
//!
//! A [`Scheduler`] runs units of work while respecting a cancellation
//! token: if the token is cancelled by the time a unit would start, the unit
//! is dropped without running. Scheduler choice is per stage, so a decoder
//! that is not safe to run concurrently can sit behind a serial scheduler
//! while transforms run in parallel.
//!
//! # Implementations
//!
//! - [`BoundedScheduler`]: semaphore-bounded, work runs on the blocking pool.
//!   [`BoundedScheduler::serial`] is the one-permit case.
//! - [`ImmediateScheduler`]: runs work inline on the submitting thread.
//!
//! # Example
//!
//! ```ignore
//! use fetchlayer::scheduler::{schedule, BoundedScheduler};
//! use fetchlayer::cancel::CancellationToken;
//!
//! let decode = BoundedScheduler::serial("decode");
//! let token = CancellationToken::new();
//! let promise = schedule(&decode, &token, move || decode_bytes(&data));
//! let value = promise.await?;
//! ```

mod bounded;
mod immediate;

pub use bounded::BoundedScheduler;
pub use immediate::ImmediateScheduler;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{LoadError, LoadResult};
use crate::policy::SchedulerPolicy;
use crate::promise::Promise;

/// A boxed unit of work.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Runs units of work under an execution policy.
pub trait Scheduler: Send + Sync {
    /// Runs `work` unless `token` is cancelled before it starts.
    ///
    /// Implementations must either run `work` exactly once or drop it
    /// without running it. Work that is already running is never
    /// interrupted.
    fn execute(&self, token: CancellationToken, work: Work);

    /// Human-readable label for logging.
    fn label(&self) -> &str;

    /// Number of units currently running.
    fn in_flight(&self) -> usize;
}

/// Runs `work` on `scheduler` and returns a promise of its result.
///
/// The promise settles with [`LoadError::Cancelled`](crate::LoadError::Cancelled)
/// if the token is cancelled before the work starts. Work that panics
/// settles it with [`LoadError::Unknown`].
pub fn schedule<T, F>(scheduler: &dyn Scheduler, token: &CancellationToken, work: F) -> Promise<T>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> LoadResult<T> + Send + 'static,
{
    let (resolver, promise) = Promise::pending();
    let guard = token.clone();
    scheduler.execute(
        token.clone(),
        Box::new(move || {
            let result = checkpoint(&guard).and_then(|()| {
                panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| {
                    warn!("Unit of work panicked");
                    Err(LoadError::unknown("unit of work panicked"))
                })
            });
            resolver.resolve(result);
        }),
    );
    promise
}

/// Builds a scheduler for `policy`.
pub fn from_policy(
    policy: SchedulerPolicy,
    label: impl Into<String>,
    runtime: Handle,
) -> Arc<dyn Scheduler> {
    let label = label.into();
    info!(label = %label, policy = %policy, "Creating stage scheduler");
    match policy {
        SchedulerPolicy::Serial => Arc::new(BoundedScheduler::with_handle(1, label, runtime)),
        SchedulerPolicy::Parallel { max_concurrency } => Arc::new(BoundedScheduler::with_handle(
            max_concurrency,
            label,
            runtime,
        )),
        SchedulerPolicy::Immediate => Arc::new(ImmediateScheduler::new(label)),
    }
}
