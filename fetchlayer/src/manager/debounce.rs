//! Coalescing trigger.
//!
//! Many triggers within one window result in a single run of the action at
//! the end of the window. A trigger that arrives while the action is running
//! schedules another run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

pub(crate) struct Debouncer {
    pending: Arc<AtomicBool>,
    window: Duration,
    runtime: Handle,
}

impl Debouncer {
    pub(crate) fn new(window: Duration, runtime: Handle) -> Self {
        Self {
            pending: Arc::new(AtomicBool::new(false)),
            window,
            runtime,
        }
    }

    /// Runs `action` once the window elapses, unless a run is already
    /// scheduled.
    pub(crate) fn trigger(&self, action: impl FnOnce() + Send + 'static) {
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending = Arc::clone(&self.pending);
        let window = self.window;
        self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            pending.store(false, Ordering::Release);
            action();
        });
    }
}
