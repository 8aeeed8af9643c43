//! Requests describing what to acquire and how.
//!
//! A [`Request`] is an immutable value: a source [`Locator`], an optional
//! transform, and the cache and load policies that gate the memory cache.
//! Requests are cheap to clone; the transform is shared behind an `Arc`.
//!
//! # Example
//!
//! ```ignore
//! use fetchlayer::{CachePolicy, Priority, Request};
//!
//! let request = Request::new("https://tiles.example.com/15/5279/12754.png")
//!     .with_transform(Arc::new(Thumbnail::new(128)))
//!     .with_cache_policy(CachePolicy { read_allowed: true, write_allowed: false })
//!     .with_priority(Priority::PREFETCH);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::pipeline::Transform;
use crate::policy::{CachePolicy, LoadPolicy, Priority};
use crate::value::Metadata;

/// Source locator, opaque to the core.
///
/// Only the [`Fetcher`](crate::pipeline::Fetcher) interprets it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator(Arc<str>);

impl Locator {
    /// Creates a locator.
    pub fn new(locator: impl AsRef<str>) -> Self {
        Self(Arc::from(locator.as_ref()))
    }

    /// Returns the locator as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({:?})", &*self.0)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Locator {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Immutable description of one acquisition.
#[derive(Clone)]
pub struct Request {
    locator: Locator,
    transform: Option<Arc<dyn Transform>>,
    cache_policy: CachePolicy,
    load_policy: LoadPolicy,
    priority: Priority,
    user_info: Metadata,
}

impl Request {
    /// Creates an on-demand request with default policies and no transform.
    pub fn new(locator: impl Into<Locator>) -> Self {
        Self {
            locator: locator.into(),
            transform: None,
            cache_policy: CachePolicy::default(),
            load_policy: LoadPolicy::default(),
            priority: Priority::default(),
            user_info: Metadata::default(),
        }
    }

    /// Sets the transform applied after decoding.
    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Sets the memory cache permissions.
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Sets whether a cached result satisfies the request.
    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Sets the request priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches caller metadata that is returned on the response.
    pub fn with_user_info(mut self, user_info: Metadata) -> Self {
        self.user_info = user_info;
        self
    }

    /// The source locator.
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// The transform, if any.
    pub fn transform(&self) -> Option<&Arc<dyn Transform>> {
        self.transform.as_ref()
    }

    /// The transform identifier, if any.
    pub fn transform_id(&self) -> Option<&str> {
        self.transform.as_deref().map(|t| t.identifier())
    }

    /// The memory cache permissions.
    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// The load policy.
    pub fn load_policy(&self) -> LoadPolicy {
        self.load_policy
    }

    /// The request priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Caller metadata.
    pub fn user_info(&self) -> &Metadata {
        &self.user_info
    }

    /// True if a cached result may satisfy this request.
    ///
    /// Requires read permission and [`LoadPolicy::ReturnCachedElseLoad`].
    pub fn reads_cache(&self) -> bool {
        self.cache_policy.read_allowed && self.load_policy == LoadPolicy::ReturnCachedElseLoad
    }

    /// True if the result of this request may be stored.
    pub fn writes_cache(&self) -> bool {
        self.cache_policy.write_allowed
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("locator", &self.locator)
            .field("transform", &self.transform_id())
            .field("cache_policy", &self.cache_policy)
            .field("load_policy", &self.load_policy)
            .field("priority", &self.priority)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    struct Named(&'static str);

    impl Transform for Named {
        fn identifier(&self) -> &str {
            self.0
        }

        fn transform(&self, value: Value) -> Option<Value> {
            Some(value)
        }
    }

    #[test]
    fn test_request_defaults() {
        let request = Request::new("mem://a");
        assert_eq!(request.locator().as_str(), "mem://a");
        assert!(request.transform().is_none());
        assert_eq!(request.cache_policy(), CachePolicy::READ_WRITE);
        assert_eq!(request.load_policy(), LoadPolicy::ReturnCachedElseLoad);
        assert_eq!(request.priority(), Priority::ON_DEMAND);
        assert!(request.reads_cache());
        assert!(request.writes_cache());
    }

    #[test]
    fn test_reload_policy_disables_cache_reads() {
        let request = Request::new("mem://a").with_load_policy(LoadPolicy::ReloadIgnoringCache);
        assert!(!request.reads_cache());
        assert!(request.writes_cache());
    }

    #[test]
    fn test_read_disallowed_disables_cache_reads() {
        let request = Request::new("mem://a").with_cache_policy(CachePolicy {
            read_allowed: false,
            write_allowed: true,
        });
        assert!(!request.reads_cache());
    }

    #[test]
    fn test_transform_identifier() {
        let request = Request::new("mem://a").with_transform(Arc::new(Named("blur:4")));
        assert_eq!(request.transform_id(), Some("blur:4"));
        assert!(format!("{:?}", request).contains("blur:4"));
    }

    #[test]
    fn test_locator_conversions() {
        let a: Locator = "x".into();
        let b: Locator = String::from("x").into();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "x");
    }
}
