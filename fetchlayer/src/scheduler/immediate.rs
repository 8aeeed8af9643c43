//! Inline scheduler.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use super::{Scheduler, Work};
use crate::cancel::CancellationToken;

/// Runs work synchronously on the submitting thread.
///
/// Suitable for cheap transforms and for deterministic tests.
#[derive(Debug)]
pub struct ImmediateScheduler {
    in_flight: AtomicUsize,
    label: String,
}

impl ImmediateScheduler {
    /// Creates an inline scheduler.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            label: label.into(),
        }
    }
}

impl Scheduler for ImmediateScheduler {
    fn execute(&self, token: CancellationToken, work: Work) {
        if token.is_cancelled() {
            trace!(label = %self.label, "Work cancelled before start");
            return;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        work();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}
