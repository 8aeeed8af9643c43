//! Semaphore-bounded scheduler.
//!
//! Each submitted unit is spawned as a tokio task that waits for a permit,
//! re-checks its cancellation token, and then runs the work on the blocking
//! pool. A unit whose token is cancelled while it waits for a permit is
//! dropped without running.
//!
//! ```text
//! execute(token, work)
//!   │
//!   ▼
//! ┌──────────────────────┐  cancelled  ┌──────────────┐
//! │ wait for permit      │────────────►│ drop work    │
//! └──────────┬───────────┘             └──────────────┘
//!            │ permit
//!            ▼
//! ┌──────────────────────┐
//! │ spawn_blocking(work) │  (permit held until work returns)
//! └──────────────────────┘
//! ```
//!
//! With one permit this is the serial policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use super::{Scheduler, Work};
use crate::cancel::CancellationToken;

/// Scheduler that runs at most `max_concurrency` units at once.
#[derive(Debug)]
pub struct BoundedScheduler {
    /// Permits for running units.
    semaphore: Arc<Semaphore>,

    /// Configured ceiling.
    max_concurrency: usize,

    /// Units currently running.
    in_flight: Arc<AtomicUsize>,

    /// Runtime used to spawn units.
    runtime: Handle,

    /// Label for debugging.
    label: String,
}

impl BoundedScheduler {
    /// Creates a scheduler on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrency` is zero or if called outside a tokio
    /// runtime.
    pub fn new(max_concurrency: usize, label: impl Into<String>) -> Self {
        Self::with_handle(max_concurrency, label, Handle::current())
    }

    /// Creates a serial (one permit) scheduler on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn serial(label: impl Into<String>) -> Self {
        Self::new(1, label)
    }

    /// Creates a scheduler that spawns on `runtime`.
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrency` is zero.
    pub fn with_handle(max_concurrency: usize, label: impl Into<String>, runtime: Handle) -> Self {
        assert!(max_concurrency > 0, "max_concurrency must be > 0");
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            in_flight: Arc::new(AtomicUsize::new(0)),
            runtime,
            label: label.into(),
        }
    }

    /// Returns the configured ceiling.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Returns the number of free permits.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Scheduler for BoundedScheduler {
    fn execute(&self, token: CancellationToken, work: Work) {
        let semaphore = Arc::clone(&self.semaphore);
        let in_flight = Arc::clone(&self.in_flight);
        let label = self.label.clone();

        self.runtime.spawn(async move {
            let permit = tokio::select! {
                biased;

                _ = token.cancelled() => {
                    trace!(label = %label, "Work cancelled while waiting for permit");
                    return;
                }

                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(label = %label, "Scheduler semaphore closed - dropping work");
                        return;
                    }
                },
            };

            if token.is_cancelled() {
                trace!(label = %label, "Work cancelled before start");
                return;
            }

            let running = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(label = %label, in_flight = running, "Starting unit of work");

            if let Err(e) = tokio::task::spawn_blocking(work).await {
                warn!(label = %label, error = %e, "Unit of work panicked");
            }

            in_flight.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
        });
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}
