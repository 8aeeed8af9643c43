//! Manager state and the transition engine.
//!
//! Every transition runs with the manager's re-entrant lock held:
//!
//! 1. consult the legality table, ignoring illegal transitions
//! 2. run the exit action (leaving `Running` for `Cancelled` cancels the
//!    pipeline token)
//! 3. store the new state
//! 4. run the entry action, which may itself trigger another transition
//!
//! `RefCell` borrows of [`ManagerState`] are kept short and never held
//! across a call that may re-enter.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use super::task::{Response, Task, TaskId, TaskState};
use super::ManagerInner;
use crate::error::{LoadError, LoadResult};
use crate::key::CacheKey;
use crate::pipeline::{Loaded, ProgressSink};

/// Mutable manager bookkeeping.
#[derive(Default)]
pub(crate) struct ManagerState {
    /// Tasks waiting on the pipeline.
    pub(crate) executing: HashMap<TaskId, Task>,
    /// In-flight preheat tasks by equivalence key.
    pub(crate) preheat: HashMap<CacheKey, Task>,
    /// Set once by `invalidate_and_cancel`.
    pub(crate) invalidated: bool,
}

impl ManagerInner {
    /// Attempts to move `task` to `next`.
    ///
    /// `response` is the pipeline result when `next` is `Completed`.
    pub(crate) fn transition(
        self: &Arc<Self>,
        task: &Task,
        next: TaskState,
        response: Option<Response>,
    ) {
        let guard = self.state.lock();
        if guard.borrow().invalidated {
            return;
        }

        let current = {
            let mut inner = task.record.inner.lock();
            let current = inner.state;
            if !current.can_transition_to(next) {
                trace!(task = %task.id(), from = %current, to = %next, "Ignoring transition");
                return;
            }
            inner.state = next;
            current
        };

        // Exit action
        if current == TaskState::Running && next == TaskState::Cancelled {
            task.token().cancel();
        }

        debug!(
            task = %task.id(),
            priority = %task.priority(),
            from = %current,
            to = %next,
            "Task transition"
        );

        match next {
            TaskState::Running => self.enter_running(task),
            TaskState::Cancelled => {
                let response = Response::failure(
                    LoadError::Cancelled,
                    task.request().user_info().clone(),
                );
                self.enter_terminal(task, response);
            }
            TaskState::Completed => {
                let response = response.unwrap_or_else(|| {
                    Response::failure(
                        LoadError::unknown("completed without a response"),
                        task.request().user_info().clone(),
                    )
                });
                self.enter_terminal(task, response);
            }
            TaskState::Suspended => {}
        }

        drop(guard);
    }

    fn enter_running(self: &Arc<Self>, task: &Task) {
        let progress = {
            let weak = Arc::downgrade(self);
            let task = task.clone();
            ProgressSink::new(move |completed, total| {
                if let Some(inner) = weak.upgrade() {
                    inner.update_progress(&task, completed, total);
                }
            })
        };

        let promise = self
            .pipeline
            .load(task.request(), task.token().clone(), progress);

        // A cache hit settles during `load`.
        if let Some(Ok(hit)) = promise.peek() {
            if hit.from_cache {
                debug!(task = %task.id(), "Memory cache hit - completing immediately");
                let response = Response::success(hit, true, task.request().user_info().clone());
                self.transition(task, TaskState::Completed, Some(response));
                return;
            }
        }

        self.state
            .lock()
            .borrow_mut()
            .executing
            .insert(task.id(), task.clone());

        let weak = Arc::downgrade(self);
        let task = task.clone();
        promise.on_complete(move |result| {
            if let Some(inner) = weak.upgrade() {
                inner.finish(&task, result);
            }
        });
    }

    /// Maps a pipeline result onto the task.
    fn finish(self: &Arc<Self>, task: &Task, result: LoadResult<Loaded>) {
        let user_info = task.request().user_info().clone();
        match result {
            Err(LoadError::Cancelled) => self.transition(task, TaskState::Cancelled, None),
            Ok(loaded) => {
                let fast = loaded.from_cache;
                let response = Response::success(loaded, fast, user_info);
                self.transition(task, TaskState::Completed, Some(response));
            }
            Err(err) => {
                let response = Response::failure(err, user_info);
                self.transition(task, TaskState::Completed, Some(response));
            }
        }
    }

    /// Entry action shared by `Completed` and `Cancelled`.
    fn enter_terminal(self: &Arc<Self>, task: &Task, response: Response) {
        let listeners = {
            let mut inner = task.record.inner.lock();
            inner.response = Some(response.clone());
            inner.progress_handler = None;
            std::mem::take(&mut inner.listeners)
        };

        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            state.executing.remove(&task.id());
            if let Some(key) = &task.record.preheat_key {
                if state.preheat.get(key).map(Task::id) == Some(task.id()) {
                    state.preheat.remove(key);
                }
            }
        }

        self.trigger_preheating();

        for listener in listeners {
            let response = response.clone();
            self.delivery.post(move || listener(response));
        }
    }

    fn update_progress(self: &Arc<Self>, task: &Task, completed: u64, total: u64) {
        let guard = self.state.lock();
        if guard.borrow().invalidated {
            return;
        }

        let (progress, handler) = {
            let mut inner = task.record.inner.lock();
            if inner.state != TaskState::Running || !inner.progress.advance(completed, total) {
                return;
            }
            (inner.progress, inner.progress_handler.clone())
        };

        if let Some(handler) = handler {
            self.delivery.post(move || handler(progress));
        }
        drop(guard);
    }
}
