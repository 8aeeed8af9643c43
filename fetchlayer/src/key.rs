//! Cache-equivalence keys.
//!
//! Two requests are *cache-equivalent* when they would produce the same
//! cached artifact. Only the pipeline knows that, so equality is delegated to
//! a [`RequestEquivalence`] strategy supplied when the key is built, instead
//! of comparing request fields directly.
//!
//! A [`CacheKey`] is used both for memory cache lookups and for preheat
//! deduplication.
//!
//! # Invariant
//!
//! `a == b` iff the strategy judges the two requests equivalent, and equal
//! keys always hash identically. Strategies must keep
//! [`RequestEquivalence::fingerprint`] consistent with
//! [`RequestEquivalence::is_equivalent`].

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::request::Request;

/// Strategy deciding when two requests share a cached result.
pub trait RequestEquivalence: Send + Sync {
    /// Returns true if both requests resolve to the same cached artifact.
    fn is_equivalent(&self, a: &Request, b: &Request) -> bool;

    /// Hash of the fields that participate in equivalence.
    fn fingerprint(&self, request: &Request) -> u64;
}

/// Locator plus transform identifier.
///
/// Cache policy, load policy, priority and user info are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEquivalence;

impl RequestEquivalence for DefaultEquivalence {
    fn is_equivalent(&self, a: &Request, b: &Request) -> bool {
        a.locator() == b.locator() && a.transform_id() == b.transform_id()
    }

    fn fingerprint(&self, request: &Request) -> u64 {
        let mut hasher = DefaultHasher::new();
        request.locator().hash(&mut hasher);
        request.transform_id().hash(&mut hasher);
        hasher.finish()
    }
}

/// Identity of a request for caching and deduplication.
#[derive(Clone)]
pub struct CacheKey {
    request: Request,
    fingerprint: u64,
    equivalence: Arc<dyn RequestEquivalence>,
}

impl CacheKey {
    /// Builds a key whose equality is owned by `equivalence`.
    pub fn new(request: &Request, equivalence: Arc<dyn RequestEquivalence>) -> Self {
        let fingerprint = equivalence.fingerprint(request);
        Self {
            request: request.clone(),
            fingerprint,
            equivalence,
        }
    }

    /// The request the key was derived from.
    pub fn request(&self) -> &Request {
        &self.request
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.equivalence.is_equivalent(&self.request, &other.request)
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheKey")
            .field("locator", self.request.locator())
            .field("transform", &self.request.transform_id())
            .field("fingerprint", &format_args!("{:016x}", self.fingerprint))
            .finish()
    }
}
