//! Task manager.
//!
//! The [`Manager`] owns every task it creates and is the only place task
//! state changes. All of its bookkeeping sits behind one re-entrant lock so
//! that an entry action may synchronously trigger another transition, for
//! example when a cache hit completes a task the moment it starts.
//!
//! Completion listeners and progress handlers never run under that lock.
//! They are posted to a delivery queue and run in FIFO order by a single
//! consumer task.
//!
//! # Example
//!
//! ```ignore
//! use fetchlayer::{Loader, Manager, ManagerConfig, Request};
//!
//! let config = ManagerConfig::default();
//! let loader = Loader::from_config(&config, fetcher, decoder, Some(cache), Handle::current());
//! let manager = Manager::new(Arc::new(loader), &config);
//!
//! let task = manager.task(Request::new("https://tiles.example.com/1/2/3.png"));
//! manager.add_completion(&task, |response| println!("{:?}", response.outcome()));
//! manager.resume(&task);
//! ```

mod debounce;
mod delivery;
mod preheat;
mod state;
mod task;

pub use task::{Progress, Response, Task, TaskId, TaskState};

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{info, trace};

use crate::config::ManagerConfig;
use crate::error::LoadError;
use crate::pipeline::Pipeline;
use crate::request::Request;
use debounce::Debouncer;
use delivery::DeliveryQueue;
use state::ManagerState;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ManagerInner {
    id: u64,
    state: ReentrantMutex<RefCell<ManagerState>>,
    pipeline: Arc<dyn Pipeline>,
    delivery: DeliveryQueue,
    preheat_trigger: Debouncer,
    max_concurrent_preheating: usize,
}

/// Creates, drives and tracks tasks.
///
/// Cloning a manager yields another handle to the same manager.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Creates a manager on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(pipeline: Arc<dyn Pipeline>, config: &ManagerConfig) -> Self {
        Self::with_handle(pipeline, config, Handle::current())
    }

    /// Creates a manager whose background work runs on `runtime`.
    pub fn with_handle(
        pipeline: Arc<dyn Pipeline>,
        config: &ManagerConfig,
        runtime: Handle,
    ) -> Self {
        let id = NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            manager = id,
            max_concurrent_preheating = config.max_concurrent_preheating_tasks,
            coalesce_window_ms = config.preheat_coalesce_window.as_millis() as u64,
            "Creating task manager"
        );
        Self {
            inner: Arc::new(ManagerInner {
                id,
                state: ReentrantMutex::new(RefCell::new(ManagerState::default())),
                pipeline,
                delivery: DeliveryQueue::start(&runtime),
                preheat_trigger: Debouncer::new(config.preheat_coalesce_window, runtime),
                max_concurrent_preheating: config.max_concurrent_preheating_tasks,
            }),
        }
    }

    /// Creates a suspended task for `request`. No work starts until
    /// [`Self::resume`].
    ///
    /// After [`Self::invalidate_and_cancel`] the task is still created but
    /// every operation on it is ignored.
    pub fn task(&self, request: Request) -> Task {
        let guard = self.inner.state.lock();
        if guard.borrow().invalidated {
            trace!(manager = self.inner.id, "Creating task on invalidated manager");
        }
        let priority = request.priority();
        let task = Task::new(self.inner.id, request, priority, None);
        drop(guard);
        task
    }

    /// Starts a suspended task.
    ///
    /// A cached result completes the task immediately; otherwise the
    /// pipeline is asked to produce one.
    ///
    /// # Panics
    ///
    /// Panics if `task` was created by another manager.
    pub fn resume(&self, task: &Task) {
        self.check_owner(task);
        self.inner.transition(task, TaskState::Running, None);
    }

    /// Cancels a suspended or running task.
    ///
    /// Cancelling a running task also cancels its pipeline work. Cancelling
    /// a terminal task does nothing.
    ///
    /// # Panics
    ///
    /// Panics if `task` was created by another manager.
    pub fn cancel(&self, task: &Task) {
        self.check_owner(task);
        self.inner.transition(task, TaskState::Cancelled, None);
    }

    /// Registers a listener for the task's response.
    ///
    /// Each listener is called exactly once, in registration order, on the
    /// delivery queue. Listeners added after the task finished receive a
    /// copy of the response marked fast.
    ///
    /// # Panics
    ///
    /// Panics if `task` was created by another manager.
    pub fn add_completion(&self, task: &Task, listener: impl FnOnce(Response) + Send + 'static) {
        self.check_owner(task);
        let guard = self.inner.state.lock();
        if guard.borrow().invalidated {
            return;
        }

        let response = {
            let mut inner = task.record.inner.lock();
            if !inner.state.is_terminal() {
                inner.listeners.push(Box::new(listener));
                return;
            }
            inner.response.clone()
        };

        if let Some(response) = response {
            let response = response.with_fast(true);
            self.inner.delivery.post(move || listener(response));
        }
        drop(guard);
    }

    /// Replaces the task's progress handler.
    ///
    /// The handler is called on the delivery queue whenever progress
    /// advances while the task is running.
    ///
    /// # Panics
    ///
    /// Panics if `task` was created by another manager.
    pub fn set_progress_handler(
        &self,
        task: &Task,
        handler: impl Fn(Progress) + Send + Sync + 'static,
    ) {
        self.check_owner(task);
        let guard = self.inner.state.lock();
        if guard.borrow().invalidated {
            return;
        }
        let mut inner = task.record.inner.lock();
        if !inner.state.is_terminal() {
            inner.progress_handler = Some(Arc::new(handler));
        }
        drop(guard);
    }

    /// Registers preheat tasks for `requests`.
    ///
    /// Requests equivalent to one already registered share its task.
    pub fn start_preheating(&self, requests: &[Request]) {
        self.inner.start_preheating(requests);
    }

    /// Cancels the preheat tasks matching `requests`.
    pub fn stop_preheating(&self, requests: &[Request]) {
        self.inner.stop_preheating(requests);
    }

    /// Cancels every preheat task.
    pub fn stop_all_preheating(&self) {
        self.inner.stop_all_preheating();
    }

    /// Cancels every executing and preheating task and shuts the manager
    /// down. Every later mutating call is ignored.
    pub fn invalidate_and_cancel(&self) {
        let guard = self.inner.state.lock();
        if guard.borrow().invalidated {
            return;
        }

        let mut tasks: Vec<Task> = guard.borrow().executing.values().cloned().collect();
        tasks.extend(self.inner.sorted_preheat_tasks());
        tasks.sort_by_key(Task::id);
        tasks.dedup();

        info!(manager = self.inner.id, tasks = tasks.len(), "Invalidating task manager");
        for task in &tasks {
            self.inner.transition(task, TaskState::Cancelled, None);
        }

        let mut state = guard.borrow_mut();
        state.preheat.clear();
        state.executing.clear();
        state.invalidated = true;
    }

    /// Returns true once [`Self::invalidate_and_cancel`] has run.
    pub fn is_invalidated(&self) -> bool {
        self.inner.state.lock().borrow().invalidated
    }

    /// Tasks currently waiting on the pipeline.
    pub fn executing_tasks(&self) -> Vec<Task> {
        let guard = self.inner.state.lock();
        let mut tasks: Vec<Task> = guard.borrow().executing.values().cloned().collect();
        tasks.sort_by_key(Task::id);
        tasks
    }

    /// Preheat tasks that have not finished, oldest first.
    pub fn preheating_tasks(&self) -> Vec<Task> {
        self.inner.sorted_preheat_tasks()
    }

    /// Ceiling used when starting preheat tasks.
    pub fn max_concurrent_preheating_tasks(&self) -> usize {
        self.inner.max_concurrent_preheating
    }

    /// Creates a task for `request`, starts it and waits for its response.
    pub async fn load(&self, request: Request) -> Response {
        let user_info = request.user_info().clone();
        let task = self.task(request);
        let (tx, rx) = oneshot::channel();
        self.add_completion(&task, move |response| {
            let _ = tx.send(response);
        });
        self.resume(&task);

        rx.await
            .unwrap_or_else(|_| Response::failure(LoadError::Cancelled, user_info))
    }

    fn check_owner(&self, task: &Task) {
        assert_eq!(
            task.record.manager_id, self.inner.id,
            "task {} belongs to a different manager",
            task.id()
        );
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (executing, preheating, invalidated) = {
            let guard = self.inner.state.lock();
            let state = guard.borrow();
            (state.executing.len(), state.preheat.len(), state.invalidated)
        };
        f.debug_struct("Manager")
            .field("id", &self.inner.id)
            .field("executing", &executing)
            .field("preheating", &preheating)
            .field("invalidated", &invalidated)
            .finish()
    }
}
