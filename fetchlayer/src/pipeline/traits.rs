//! Capability traits the pipeline is assembled from.
//!
//! These traits define the interface between the pipeline and its pluggable
//! stages. The core never implements a transport, a codec, or an image
//! operation itself; callers provide them.
//!
//! # Design Principles
//!
//! - **Object safe**: Stages are held as `Arc<dyn Trait>` so several
//!   implementations may coexist in one process
//! - **Cancellation aware**: The fetcher receives the task's token and should
//!   stop early when it fires
//! - **Failure as absence**: Decoders and transforms report failure with
//!   `None`; the pipeline classifies it

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::cancel::CancellationToken;
use crate::error::LoadResult;
use crate::pipeline::ProgressSink;
use crate::request::Locator;
use crate::value::{Metadata, Value};

/// Raw bytes produced by a [`Fetcher`].
#[derive(Clone, Debug, Default)]
pub struct Fetched {
    /// Payload.
    pub data: Bytes,
    /// Transport metadata (content type, validators, ...).
    pub metadata: Metadata,
}

impl Fetched {
    /// Creates a fetch result without metadata.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attaches metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Retrieves raw bytes for a locator.
///
/// Implementations should return [`LoadError::Fetch`](crate::LoadError::Fetch)
/// for transport errors, which the pipeline passes through unchanged.
pub trait Fetcher: Send + Sync {
    /// Fetches the bytes behind `locator`.
    ///
    /// `progress` may be called with `(completed, total)` byte counts as the
    /// transfer advances.
    fn fetch(
        &self,
        locator: &Locator,
        token: CancellationToken,
        progress: ProgressSink,
    ) -> BoxFuture<'static, LoadResult<Fetched>>;
}

/// Turns fetched bytes into a value.
pub trait Decoder: Send + Sync {
    /// Returns `None` if the bytes cannot be decoded.
    fn decode(&self, data: &Bytes, metadata: &Metadata) -> Option<Value>;
}

/// Post-decode operation attached to a request.
///
/// Two transforms with the same identifier are treated as the same
/// operation for caching and preheat deduplication.
pub trait Transform: Send + Sync {
    /// Stable identifier of the operation and its parameters.
    fn identifier(&self) -> &str;

    /// Returns `None` if the transform fails.
    fn transform(&self, value: Value) -> Option<Value>;
}
