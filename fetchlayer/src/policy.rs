//! Policy types for request handling and stage scheduling.
//!
//! # Policy Types
//!
//! - [`CachePolicy`]: Whether a request may read from / write to the memory cache
//! - [`LoadPolicy`]: Whether a cached result satisfies the request
//! - [`Priority`]: Informational request priority (higher = more important)
//! - [`SchedulerPolicy`]: Execution policy for a pipeline stage
//!
//! # Example
//!
//! ```
//! use fetchlayer::policy::{CachePolicy, LoadPolicy, Priority, SchedulerPolicy};
//!
//! // Read through the cache but never store the result
//! let cache = CachePolicy { read_allowed: true, write_allowed: false };
//! assert!(cache.read_allowed);
//!
//! // Decoder that is not safe to run concurrently
//! let decode = SchedulerPolicy::Serial;
//! assert_eq!(decode.max_concurrency(), Some(1));
//!
//! assert!(Priority::ON_DEMAND > Priority::PREFETCH);
//! assert_eq!(LoadPolicy::default(), LoadPolicy::ReturnCachedElseLoad);
//! ```

use std::fmt;
use std::str::FromStr;

// =============================================================================
// Priority Constants
// =============================================================================

/// Priority value for requests a caller is actively waiting on.
pub const PRIORITY_ON_DEMAND: i32 = 100;

/// Priority value for preheat (background prefetch) requests.
pub const PRIORITY_PREFETCH: i32 = 0;

/// Memory cache permissions for a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CachePolicy {
    /// The request may be satisfied from the memory cache.
    pub read_allowed: bool,
    /// The result of the request may be stored in the memory cache.
    pub write_allowed: bool,
}

impl CachePolicy {
    /// Read and write allowed.
    pub const READ_WRITE: CachePolicy = CachePolicy {
        read_allowed: true,
        write_allowed: true,
    };

    /// The memory cache is bypassed entirely.
    pub const BYPASS: CachePolicy = CachePolicy {
        read_allowed: false,
        write_allowed: false,
    };
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::READ_WRITE
    }
}

/// Whether a cached result may satisfy a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadPolicy {
    /// Return the cached result if present, otherwise load.
    #[default]
    ReturnCachedElseLoad,

    /// Always run the pipeline; cached results are never returned.
    ///
    /// The result may still be written to the cache if the request's
    /// [`CachePolicy`] allows it.
    ReloadIgnoringCache,
}

/// Request priority.
///
/// Priority is carried on every request and logged with its task's
/// transitions. Preheat tasks are always created with [`Priority::PREFETCH`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// A caller is waiting on the result.
    pub const ON_DEMAND: Priority = Priority(PRIORITY_ON_DEMAND);

    /// Background preheat work.
    pub const PREFETCH: Priority = Priority(PRIORITY_PREFETCH);

    /// Creates a new priority with the given value.
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the numeric priority value.
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::ON_DEMAND
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ON_DEMAND => write!(f, "on-demand"),
            Self::PREFETCH => write!(f, "prefetch"),
            Self(v) => write!(f, "{}", v),
        }
    }
}

/// Execution policy for a pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerPolicy {
    /// At most one unit of work at a time.
    ///
    /// Use for capabilities that are not safe to run concurrently.
    Serial,

    /// Up to `max_concurrency` units of work at a time.
    Parallel {
        /// Maximum number of concurrently running units.
        max_concurrency: usize,
    },

    /// Run on the calling thread as soon as the work is submitted.
    Immediate,
}

impl SchedulerPolicy {
    /// Creates a bounded-parallel policy.
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrency` is zero.
    pub fn parallel(max_concurrency: usize) -> Self {
        assert!(max_concurrency > 0, "max_concurrency must be > 0");
        Self::Parallel { max_concurrency }
    }

    /// Bounded-parallel policy sized to the machine.
    pub fn available_parallelism() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        Self::Parallel {
            max_concurrency: cpus,
        }
    }

    /// Returns the concurrency ceiling, or `None` for inline execution.
    pub fn max_concurrency(&self) -> Option<usize> {
        match self {
            Self::Serial => Some(1),
            Self::Parallel { max_concurrency } => Some(*max_concurrency),
            Self::Immediate => None,
        }
    }
}

impl fmt::Display for SchedulerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Parallel { max_concurrency } => write!(f, "parallel:{}", max_concurrency),
            Self::Immediate => write!(f, "immediate"),
        }
    }
}

impl FromStr for SchedulerPolicy {
    type Err = String;

    /// Parses `serial`, `immediate`, `parallel` or `parallel:<n>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "serial" => Ok(Self::Serial),
            "immediate" => Ok(Self::Immediate),
            "parallel" => Ok(Self::available_parallelism()),
            other => {
                let count = other
                    .strip_prefix("parallel:")
                    .ok_or_else(|| "must be one of: serial, immediate, parallel[:N]".to_string())?;
                match count.trim().parse::<usize>() {
                    Ok(n) if n > 0 => Ok(Self::Parallel { max_concurrency: n }),
                    _ => Err("parallel concurrency must be a positive integer".to_string()),
                }
            }
        }
    }
}
