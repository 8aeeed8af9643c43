//! Task handles and their lifecycle types.
//!
//! A [`Task`] is a cheap, cloneable handle to a record owned by the
//! [`Manager`](super::Manager). Every mutation goes through the manager;
//! the handle only offers read-only accessors.
//!
//! # Lifecycle
//!
//! ```text
//! Suspended ──resume──► Running ──pipeline done──► Completed
//!     │                    │
//!     └──cancel──►  Cancelled  ◄──cancel──┘
//! ```
//!
//! `Completed` and `Cancelled` are terminal. Any other attempted transition
//! is ignored.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cancel::CancellationToken;
use crate::error::{LoadError, LoadResult};
use crate::key::CacheKey;
use crate::pipeline::Loaded;
use crate::policy::Priority;
use crate::request::Request;
use crate::value::{Metadata, Value};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing task identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identifier value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Created, not yet started.
    Suspended,
    /// Waiting on the pipeline.
    Running,
    /// Finished with a result (success or failure).
    Completed,
    /// Cancelled before finishing.
    Cancelled,
}

impl TaskState {
    /// Returns true if the state machine permits moving to `next`.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Suspended, TaskState::Running)
                | (TaskState::Suspended, TaskState::Cancelled)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Cancelled)
        )
    }

    /// Returns true for `Completed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Suspended => "suspended",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Progress counts reported by the fetch stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    /// Units completed so far.
    pub completed: u64,
    /// Expected total units, zero if unknown.
    pub total: u64,
}

impl Progress {
    /// Fraction complete in `0.0..=1.0`, or `None` if the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some((self.completed as f64 / self.total as f64).min(1.0))
        }
    }

    /// Merges a new report. Neither count ever decreases.
    ///
    /// Returns true if anything changed.
    pub(crate) fn advance(&mut self, completed: u64, total: u64) -> bool {
        let next = Progress {
            completed: self.completed.max(completed),
            total: self.total.max(total),
        };
        let changed = next != *self;
        *self = next;
        changed
    }
}

/// Terminal outcome of a task.
#[derive(Clone, Debug)]
pub struct Response {
    outcome: LoadResult<Loaded>,
    fast: bool,
    user_info: Metadata,
}

impl Response {
    /// Creates a successful response.
    pub fn success(loaded: Loaded, fast: bool, user_info: Metadata) -> Self {
        Self {
            outcome: Ok(loaded),
            fast,
            user_info,
        }
    }

    /// Creates a failed response.
    pub fn failure(error: LoadError, user_info: Metadata) -> Self {
        Self {
            outcome: Err(error),
            fast: false,
            user_info,
        }
    }

    /// The result.
    pub fn outcome(&self) -> &LoadResult<Loaded> {
        &self.outcome
    }

    /// Consumes the response, returning the result.
    pub fn into_outcome(self) -> LoadResult<Loaded> {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The produced value on success.
    pub fn value(&self) -> Option<&Value> {
        self.outcome.as_ref().ok().map(|loaded| &loaded.value)
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&LoadError> {
        self.outcome.as_ref().err()
    }

    /// True if the value came from the memory cache.
    pub fn from_cache(&self) -> bool {
        matches!(&self.outcome, Ok(loaded) if loaded.from_cache)
    }

    /// True if the response was available without waiting on the pipeline.
    ///
    /// Informational only.
    pub fn is_fast(&self) -> bool {
        self.fast
    }

    /// Caller metadata from the originating request.
    pub fn user_info(&self) -> &Metadata {
        &self.user_info
    }

    pub(crate) fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }
}

pub(crate) type Listener = Box<dyn FnOnce(Response) + Send>;
pub(crate) type ProgressHandler = Arc<dyn Fn(Progress) + Send + Sync>;

/// Mutable task fields. Written only while the manager lock is held.
pub(crate) struct TaskInner {
    pub(crate) state: TaskState,
    pub(crate) response: Option<Response>,
    pub(crate) progress: Progress,
    pub(crate) listeners: Vec<Listener>,
    pub(crate) progress_handler: Option<ProgressHandler>,
}

pub(crate) struct TaskRecord {
    pub(crate) id: TaskId,
    pub(crate) manager_id: u64,
    pub(crate) request: Request,
    pub(crate) priority: Priority,
    pub(crate) token: CancellationToken,
    /// Registry key for preheat-originated tasks.
    pub(crate) preheat_key: Option<CacheKey>,
    pub(crate) inner: Mutex<TaskInner>,
}

/// Handle to a task owned by a [`Manager`](super::Manager).
///
/// Cloning a handle does not clone the task.
#[derive(Clone)]
pub struct Task {
    pub(crate) record: Arc<TaskRecord>,
}

impl Task {
    pub(crate) fn new(
        manager_id: u64,
        request: Request,
        priority: Priority,
        preheat_key: Option<CacheKey>,
    ) -> Self {
        Self {
            record: Arc::new(TaskRecord {
                id: TaskId::next(),
                manager_id,
                request,
                priority,
                token: CancellationToken::new(),
                preheat_key,
                inner: Mutex::new(TaskInner {
                    state: TaskState::Suspended,
                    response: None,
                    progress: Progress::default(),
                    listeners: Vec::new(),
                    progress_handler: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.record.id
    }

    /// The request this task was created for.
    pub fn request(&self) -> &Request {
        &self.record.request
    }

    pub fn priority(&self) -> Priority {
        self.record.priority
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.record.inner.lock().state
    }

    /// Returns true once the task is `Completed` or `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Latest progress.
    pub fn progress(&self) -> Progress {
        self.record.inner.lock().progress
    }

    /// The response, available once the task is terminal.
    pub fn response(&self) -> Option<Response> {
        self.record.inner.lock().response.clone()
    }

    /// True if the task was created by preheating.
    pub fn is_preheat(&self) -> bool {
        self.record.preheat_key.is_some()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.record.token
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.record.id)
            .field("locator", self.record.request.locator())
            .field("state", &self.state())
            .field("priority", &self.record.priority)
            .finish()
    }
}
