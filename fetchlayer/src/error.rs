//! Error taxonomy for loads.
//!
//! Every failure a caller can observe on a task's [`Response`](crate::Response)
//! is a [`LoadError`]. Pipeline stages classify their own failures
//! (`DecodingFailed`, `TransformFailed`); transport errors raised by a
//! [`Fetcher`](crate::pipeline::Fetcher) pass through untranslated inside
//! [`LoadError::Fetch`].
//!
//! `LoadError` is `Clone` because a single terminal failure is delivered to
//! every listener registered on a task.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Classified failure of a load.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// Unclassified failure reported by the fetch capability.
    #[error("Unknown load failure: {0}")]
    Unknown(String),

    /// The task or stage was cancelled before it could complete.
    #[error("Load was cancelled")]
    Cancelled,

    /// The decoder rejected the fetched data.
    #[error("Failed to decode fetched data")]
    DecodingFailed,

    /// The transform rejected the decoded value.
    #[error("Failed to transform decoded value")]
    TransformFailed,

    /// Transport-specific error from the fetch capability, passed through.
    #[error("Fetch failed: {0}")]
    Fetch(Arc<dyn StdError + Send + Sync>),
}

impl LoadError {
    /// Wraps a transport error without translating it.
    pub fn fetch(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Fetch(Arc::new(err))
    }

    /// Creates an unclassified failure.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown(message.into())
    }

    /// Returns true if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the underlying transport error, if any.
    pub fn fetch_source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Fetch(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Short, stable name for logging fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unknown(_) => "unknown",
            Self::Cancelled => "cancelled",
            Self::DecodingFailed => "decoding_failed",
            Self::TransformFailed => "transform_failed",
            Self::Fetch(_) => "fetch",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type LoadResult<T> = Result<T, LoadError>;
