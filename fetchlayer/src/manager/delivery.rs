//! Delivery queue for listener and progress callbacks.
//!
//! Callbacks posted while the manager lock is held are queued here and run
//! later, one at a time in FIFO order, by a single consumer task. This keeps
//! caller code out of the critical section and preserves per-task
//! registration order.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub(crate) type Job = Box<dyn FnOnce() + Send>;

pub(crate) struct DeliveryQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl DeliveryQueue {
    /// Starts the consumer on `runtime`.
    ///
    /// The consumer exits once the queue is dropped and drained.
    pub(crate) fn start(runtime: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        runtime.spawn(async move {
            while let Some(job) = rx.recv().await {
                // A panicking listener must not stop delivery to the others.
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    warn!("Completion listener panicked");
                }
            }
            debug!("Delivery queue drained");
        });
        Self { tx }
    }

    pub(crate) fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            warn!("Delivery queue stopped - dropping callback");
        }
    }
}
