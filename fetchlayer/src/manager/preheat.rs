//! Background preheating.
//!
//! Preheat requests become low-priority tasks registered under their
//! equivalence key, so equivalent requests share one task. Registered tasks
//! start suspended and are resumed oldest first by [`update_preheating`]
//! while fewer than the configured ceiling of tasks are executing.
//! Re-evaluation is debounced and triggered whenever a task reaches a
//! terminal state or new preheat tasks are registered.
//!
//! [`update_preheating`]: ManagerInner::update_preheating

use std::sync::Arc;

use tracing::{debug, info};

use super::task::{Task, TaskState};
use super::ManagerInner;
use crate::policy::Priority;
use crate::request::Request;

impl ManagerInner {
    pub(crate) fn start_preheating(self: &Arc<Self>, requests: &[Request]) {
        let guard = self.state.lock();
        if guard.borrow().invalidated {
            return;
        }

        let mut added = 0usize;
        for request in requests {
            let key = self.pipeline.cache_key(request);
            let mut state = guard.borrow_mut();
            if state.preheat.contains_key(&key) {
                continue;
            }
            let task = Task::new(
                self.id,
                request.clone().with_priority(Priority::PREFETCH),
                Priority::PREFETCH,
                Some(key.clone()),
            );
            debug!(task = %task.id(), locator = %request.locator(), "Registered preheat task");
            state.preheat.insert(key, task);
            added += 1;
        }

        if added > 0 {
            debug!(added, "Preheat requests registered");
            self.trigger_preheating();
        }
        drop(guard);
    }

    pub(crate) fn stop_preheating(self: &Arc<Self>, requests: &[Request]) {
        let guard = self.state.lock();
        if guard.borrow().invalidated {
            return;
        }

        let tasks: Vec<Task> = {
            let state = guard.borrow();
            requests
                .iter()
                .filter_map(|request| {
                    let key = self.pipeline.cache_key(request);
                    state.preheat.get(&key).cloned()
                })
                .collect()
        };

        for task in &tasks {
            self.transition(task, TaskState::Cancelled, None);
        }
        drop(guard);
    }

    pub(crate) fn stop_all_preheating(self: &Arc<Self>) {
        let guard = self.state.lock();
        if guard.borrow().invalidated {
            return;
        }

        let tasks = self.sorted_preheat_tasks();
        info!(count = tasks.len(), "Stopping all preheating");
        for task in &tasks {
            self.transition(task, TaskState::Cancelled, None);
        }
        drop(guard);
    }

    /// Schedules a debounced call to [`Self::update_preheating`].
    pub(crate) fn trigger_preheating(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.preheat_trigger.trigger(move || {
            if let Some(inner) = weak.upgrade() {
                inner.update_preheating();
            }
        });
    }

    /// Resumes suspended preheat tasks, oldest first, while capacity remains.
    ///
    /// Capacity is the preheat ceiling minus every executing task, whatever
    /// its origin.
    pub(crate) fn update_preheating(self: &Arc<Self>) {
        let guard = self.state.lock();
        if guard.borrow().invalidated {
            return;
        }

        let candidates: Vec<Task> = self
            .sorted_preheat_tasks()
            .into_iter()
            .filter(|task| task.state() == TaskState::Suspended)
            .collect();

        for task in candidates {
            let executing = guard.borrow().executing.len();
            if executing >= self.max_concurrent_preheating {
                break;
            }
            debug!(
                task = %task.id(),
                priority = %task.priority(),
                executing,
                "Starting preheat task"
            );
            self.transition(&task, TaskState::Running, None);
        }
        drop(guard);
    }

    /// Registry tasks ordered by ascending id.
    pub(crate) fn sorted_preheat_tasks(&self) -> Vec<Task> {
        let guard = self.state.lock();
        let mut tasks: Vec<Task> = guard.borrow().preheat.values().cloned().collect();
        tasks.sort_by_key(Task::id);
        tasks
    }
}
