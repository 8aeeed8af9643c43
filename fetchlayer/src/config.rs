//! Manager configuration.
//!
//! Configuration is plain data with defaults. It can be built in code with
//! the `with_*` setters or loaded from an INI file:
//!
//! ```ini
//! [preheat]
//! max_concurrent_tasks = 4
//! coalesce_window_ms = 10
//!
//! [scheduler]
//! decode = serial
//! transform = parallel:4
//!
//! [memory_cache]
//! max_cost = 268435456
//! ttl_secs = 600
//! ```
//!
//! Unknown sections and keys are ignored. Missing keys keep their defaults.

use std::path::Path;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::policy::SchedulerPolicy;

// ==================== Defaults ====================

/// Default ceiling on concurrently executing tasks when starting preheat
/// tasks.
pub const DEFAULT_MAX_CONCURRENT_PREHEATING_TASKS: usize = 2;

/// Default window over which preheat re-evaluations are coalesced.
pub const DEFAULT_PREHEAT_COALESCE_WINDOW: Duration = Duration::from_millis(5);

/// Default memory cache capacity (sum of value costs).
pub const DEFAULT_MEMORY_CACHE_MAX_COST: u64 = 128 * 1024 * 1024;

/// Default decode stage policy.
pub const DEFAULT_DECODE_SCHEDULER: SchedulerPolicy = SchedulerPolicy::Serial;

/// Default transform stage policy.
pub const DEFAULT_TRANSFORM_SCHEDULER: SchedulerPolicy = SchedulerPolicy::Immediate;

/// Error loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The file is not valid INI.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range or malformed.
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(section: &str, key: &str, value: &str, reason: &str) -> Self {
        Self::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Memory cache sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCacheConfig {
    /// Maximum sum of value costs.
    pub max_cost: u64,

    /// Optional time-to-live for entries.
    pub ttl: Option<Duration>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_cost: DEFAULT_MEMORY_CACHE_MAX_COST,
            ttl: None,
        }
    }
}

/// Configuration for a [`Manager`](crate::manager::Manager) and its
/// [`Loader`](crate::pipeline::Loader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    // ==================== Preheating ====================
    /// Preheat tasks are only resumed while fewer than this many tasks
    /// (of any origin) are executing.
    ///
    /// Default: 2.
    pub max_concurrent_preheating_tasks: usize,

    /// Window over which preheat re-evaluations are coalesced.
    ///
    /// Default: 5ms.
    pub preheat_coalesce_window: Duration,

    // ==================== Scheduling ====================
    /// Policy for the decode stage. Default: serial.
    pub decode_scheduler: SchedulerPolicy,

    /// Policy for the transform stage. Default: immediate.
    pub transform_scheduler: SchedulerPolicy,

    // ==================== Caching ====================
    /// Memory cache sizing.
    pub memory_cache: MemoryCacheConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_preheating_tasks: DEFAULT_MAX_CONCURRENT_PREHEATING_TASKS,
            preheat_coalesce_window: DEFAULT_PREHEAT_COALESCE_WINDOW,
            decode_scheduler: DEFAULT_DECODE_SCHEDULER,
            transform_scheduler: DEFAULT_TRANSFORM_SCHEDULER,
            memory_cache: MemoryCacheConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Sets the preheat concurrency ceiling.
    pub fn with_max_concurrent_preheating_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_preheating_tasks = max;
        self
    }

    /// Sets the preheat coalescing window.
    pub fn with_preheat_coalesce_window(mut self, window: Duration) -> Self {
        self.preheat_coalesce_window = window;
        self
    }

    /// Sets the decode stage policy.
    pub fn with_decode_scheduler(mut self, policy: SchedulerPolicy) -> Self {
        self.decode_scheduler = policy;
        self
    }

    /// Sets the transform stage policy.
    pub fn with_transform_scheduler(mut self, policy: SchedulerPolicy) -> Self {
        self.transform_scheduler = policy;
        self
    }

    /// Sets the memory cache sizing.
    pub fn with_memory_cache(mut self, memory_cache: MemoryCacheConfig) -> Self {
        self.memory_cache = memory_cache;
        self
    }

    /// Loads configuration from an INI file.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_ini_str(&content)
    }

    /// Parses configuration from INI text, overlaying defaults.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        parse_ini(&ini)
    }
}

fn parse_ini(ini: &Ini) -> Result<ManagerConfig, ConfigError> {
    let mut config = ManagerConfig::default();

    // [preheat] section
    if let Some(section) = ini.section(Some("preheat")) {
        if let Some(v) = section.get("max_concurrent_tasks") {
            config.max_concurrent_preheating_tasks = v
                .trim()
                .parse()
                .map_err(|_| {
                    ConfigError::invalid("preheat", "max_concurrent_tasks", v, "must be an integer")
                })?;
        }
        if let Some(v) = section.get("coalesce_window_ms") {
            let ms: u64 = v.trim().parse().map_err(|_| {
                ConfigError::invalid(
                    "preheat",
                    "coalesce_window_ms",
                    v,
                    "must be a non-negative integer (milliseconds)",
                )
            })?;
            config.preheat_coalesce_window = Duration::from_millis(ms);
        }
    }

    // [scheduler] section
    if let Some(section) = ini.section(Some("scheduler")) {
        if let Some(v) = section.get("decode") {
            config.decode_scheduler = parse_scheduler("decode", v)?;
        }
        if let Some(v) = section.get("transform") {
            config.transform_scheduler = parse_scheduler("transform", v)?;
        }
    }

    // [memory_cache] section
    if let Some(section) = ini.section(Some("memory_cache")) {
        if let Some(v) = section.get("max_cost") {
            config.memory_cache.max_cost = v.trim().parse().map_err(|_| {
                ConfigError::invalid("memory_cache", "max_cost", v, "must be a positive integer")
            })?;
        }
        if let Some(v) = section.get("ttl_secs") {
            let v = v.trim();
            config.memory_cache.ttl = if v.is_empty() || v == "0" {
                None
            } else {
                let secs: u64 = v.parse().map_err(|_| {
                    ConfigError::invalid(
                        "memory_cache",
                        "ttl_secs",
                        v,
                        "must be a non-negative integer (seconds)",
                    )
                })?;
                Some(Duration::from_secs(secs))
            };
        }
    }

    Ok(config)
}

fn parse_scheduler(key: &str, value: &str) -> Result<SchedulerPolicy, ConfigError> {
    value.parse().map_err(|_| {
        ConfigError::invalid(
            "scheduler",
            key,
            value,
            "must be one of: serial, immediate, parallel, parallel:<n>",
        )
    })
}
