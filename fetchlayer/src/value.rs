//! Type-erased produced values and string metadata.
//!
//! The pipeline does not know what its decoders produce. A [`Value`] holds
//! any `Send + Sync` payload behind an `Arc` and is retrieved by type with
//! [`Value::downcast_ref`]. A value also carries a cost in bytes, which the
//! memory cache uses as its weight.
//!
//! # Example
//!
//! ```
//! use fetchlayer::value::Value;
//!
//! let value = Value::with_cost(vec![0u8; 64], 64);
//! assert_eq!(value.downcast_ref::<Vec<u8>>().map(|v| v.len()), Some(64));
//! assert_eq!(value.downcast_ref::<String>(), None); // Wrong type
//! assert_eq!(value.cost(), 64);
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A decoded (and possibly transformed) payload.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    cost: usize,
}

impl Value {
    /// Wraps a payload with a nominal cost of one.
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Self::with_cost(payload, 1)
    }

    /// Wraps a payload with an explicit cost in bytes.
    pub fn with_cost<T: Any + Send + Sync>(payload: T, cost: usize) -> Self {
        Self {
            inner: Arc::new(payload),
            cost,
        }
    }

    /// Returns the payload if it has type `T`.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Returns true if the payload has type `T`.
    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Returns the cost used for cache weighting.
    pub fn cost(&self) -> usize {
        self.cost
    }

    /// Returns true if both values share the same allocation.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value").field("cost", &self.cost).finish()
    }
}

/// Auxiliary string metadata.
///
/// Used for fetch metadata (e.g. content type) and for caller-supplied user
/// info that travels with a request to its response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, String>,
}

impl Metadata {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Stores a value, replacing any previous value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
