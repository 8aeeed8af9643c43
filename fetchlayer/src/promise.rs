//! Single-assignment asynchronous results.
//!
//! A [`Promise`] is the read side of a value that settles exactly once,
//! either with a value or a [`LoadError`]. The write side is a
//! [`Resolver`]. Continuations can be chained with [`Promise::then`],
//! [`Promise::map`] and [`Promise::catch`], and a promise can be awaited
//! directly because it implements [`IntoFuture`].
//!
//! # Guarantees
//!
//! - A callback registered after settlement still fires (no missed wakeup).
//! - Each callback fires at most once.
//! - Settling an already settled promise is a no-op and returns `false`.
//! - Dropping the [`Resolver`] without settling settles the promise with
//!   [`LoadError::Cancelled`], so observers never wait forever.
//!
//! Callbacks run on whichever thread settles the promise, or inline on the
//! registering thread when the promise is already settled. They are never
//! run while the promise's internal lock is held.
//!
//! # Example
//!
//! ```
//! use fetchlayer::promise::Promise;
//!
//! let (resolver, promise) = Promise::<u32>::pending();
//! let doubled = promise.map(|v| Ok(v * 2));
//! resolver.resolve(Ok(21));
//! assert_eq!(doubled.peek().unwrap().unwrap(), 42);
//! ```

use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{LoadError, LoadResult};

type Callback<T> = Box<dyn FnOnce(LoadResult<T>) + Send>;

enum Slot<T> {
    Pending(Vec<Callback<T>>),
    Settled(LoadResult<T>),
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn settle(&self, result: LoadResult<T>) -> bool {
        let callbacks = {
            let mut slot = self.slot.lock();
            match &mut *slot {
                Slot::Settled(_) => return false,
                Slot::Pending(callbacks) => {
                    let callbacks = std::mem::take(callbacks);
                    *slot = Slot::Settled(result.clone());
                    callbacks
                }
            }
        };

        for callback in callbacks {
            callback(result.clone());
        }
        true
    }
}

/// Read side of a single-assignment result.
///
/// Cloning a promise yields another observer of the same result.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Write side of a [`Promise`].
pub struct Resolver<T: Clone + Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Resolver<T> {
    /// Settles the promise.
    ///
    /// Returns `false` if the promise was already settled, in which case the
    /// result is discarded and no callback fires again.
    pub fn resolve(&self, result: LoadResult<T>) -> bool {
        self.shared.settle(result)
    }

    /// Returns true if the promise has been settled.
    pub fn is_settled(&self) -> bool {
        matches!(*self.shared.slot.lock(), Slot::Settled(_))
    }
}

impl<T: Clone + Send + 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        // Abandoned work settles as cancelled.
        self.shared.settle(Err(LoadError::Cancelled));
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Creates an unsettled promise and its resolver.
    pub fn pending() -> (Resolver<T>, Promise<T>) {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::Pending(Vec::new())),
        });
        (
            Resolver {
                shared: Arc::clone(&shared),
            },
            Promise { shared },
        )
    }

    /// Creates an already settled promise.
    pub fn resolved(result: LoadResult<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::Settled(result)),
            }),
        }
    }

    /// Creates a promise settled with a value.
    pub fn ok(value: T) -> Self {
        Self::resolved(Ok(value))
    }

    /// Creates a promise settled with an error.
    pub fn err(error: LoadError) -> Self {
        Self::resolved(Err(error))
    }

    /// Returns true if the promise has been settled.
    pub fn is_settled(&self) -> bool {
        matches!(*self.shared.slot.lock(), Slot::Settled(_))
    }

    /// Returns a copy of the result if settled.
    pub fn peek(&self) -> Option<LoadResult<T>> {
        match &*self.shared.slot.lock() {
            Slot::Settled(result) => Some(result.clone()),
            Slot::Pending(_) => None,
        }
    }

    /// Registers a callback that fires once with the result.
    ///
    /// If the promise is already settled the callback runs immediately on
    /// the calling thread.
    pub fn on_complete(&self, callback: impl FnOnce(LoadResult<T>) + Send + 'static) {
        let settled = {
            let mut slot = self.shared.slot.lock();
            match &mut *slot {
                Slot::Pending(callbacks) => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                Slot::Settled(result) => result.clone(),
            }
        };
        callback(settled);
    }

    /// Chains an asynchronous continuation that runs on success.
    ///
    /// Failures skip the continuation and propagate to the returned promise.
    pub fn then<U, F>(&self, continuation: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let (resolver, next) = Promise::pending();
        self.on_complete(move |result| match result {
            Ok(value) => continuation(value).on_complete(move |inner| {
                resolver.resolve(inner);
            }),
            Err(err) => {
                resolver.resolve(Err(err));
            }
        });
        next
    }

    /// Chains a synchronous continuation that runs on success.
    pub fn map<U, F>(&self, continuation: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> LoadResult<U> + Send + 'static,
    {
        let (resolver, next) = Promise::pending();
        self.on_complete(move |result| {
            resolver.resolve(result.and_then(continuation));
        });
        next
    }

    /// Observes a failure without altering the result.
    pub fn catch<F>(&self, handler: F) -> Promise<T>
    where
        F: FnOnce(&LoadError) + Send + 'static,
    {
        let (resolver, next) = Promise::pending();
        self.on_complete(move |result| {
            if let Err(err) = &result {
                handler(err);
            }
            resolver.resolve(result);
        });
        next
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Promise<T> {
    type Output = LoadResult<T>;
    type IntoFuture = BoxFuture<'static, LoadResult<T>>;

    fn into_future(self) -> Self::IntoFuture {
        let (tx, rx) = oneshot::channel();
        self.on_complete(move |result| {
            let _ = tx.send(result);
        });
        Box::pin(async move { rx.await.unwrap_or(Err(LoadError::Cancelled)) })
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.slot.lock() {
            Slot::Pending(callbacks) => format!("Pending({} callbacks)", callbacks.len()),
            Slot::Settled(Ok(_)) => "Fulfilled".to_string(),
            Slot::Settled(Err(err)) => format!("Rejected({})", err.kind()),
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_callback_fires_on_resolve() {
        let (resolver, promise) = Promise::<u32>::pending();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        promise.on_complete(move |r| {
            seen_clone.store(r.unwrap() as usize, Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(resolver.resolve(Ok(7)));
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_late_callback_still_fires() {
        let promise = Promise::ok(5u32);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        promise.on_complete(move |r| {
            seen_clone.store(r.unwrap() as usize, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_second_resolve_is_noop() {
        let (resolver, promise) = Promise::<u32>::pending();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        promise.on_complete(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(resolver.resolve(Ok(1)));
        assert!(!resolver.resolve(Ok(2)));
        assert!(!resolver.resolve(Err(LoadError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(promise.peek().unwrap().unwrap(), 1);
    }

    #[test]
    fn test_dropped_resolver_cancels() {
        let (resolver, promise) = Promise::<u32>::pending();
        drop(resolver);
        assert!(matches!(promise.peek(), Some(Err(LoadError::Cancelled))));
    }

    #[test]
    fn test_then_chains_values() {
        let (resolver, promise) = Promise::<u32>::pending();
        let chained = promise
            .then(|v| Promise::ok(v + 1))
            .map(|v| Ok(format!("value={}", v)));

        assert!(!chained.is_settled());
        resolver.resolve(Ok(41));
        assert_eq!(chained.peek().unwrap().unwrap(), "value=42");
    }

    #[test]
    fn test_failure_short_circuits_chain() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_then = Arc::clone(&ran);
        let ran_map = Arc::clone(&ran);

        let chained = Promise::<u32>::err(LoadError::DecodingFailed)
            .then(move |v| {
                ran_then.fetch_add(1, Ordering::SeqCst);
                Promise::ok(v)
            })
            .map(move |v| {
                ran_map.fetch_add(1, Ordering::SeqCst);
                Ok(v)
            });

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(matches!(chained.peek(), Some(Err(LoadError::DecodingFailed))));
    }

    #[test]
    fn test_map_can_fail() {
        let mapped = Promise::ok(3u32).map(|_| Err::<u32, _>(LoadError::TransformFailed));
        assert!(matches!(mapped.peek(), Some(Err(LoadError::TransformFailed))));
    }

    #[test]
    fn test_catch_observes_failure_only() {
        let caught = Arc::new(AtomicUsize::new(0));

        let caught_clone = Arc::clone(&caught);
        let ok = Promise::ok(1u32).catch(move |_| {
            caught_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ok.peek().unwrap().unwrap(), 1);

        let caught_clone = Arc::clone(&caught);
        let failed = Promise::<u32>::err(LoadError::Cancelled).catch(move |err| {
            assert!(err.is_cancelled());
            caught_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(matches!(failed.peek(), Some(Err(LoadError::Cancelled))));
        assert_eq!(caught.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_await_across_threads() {
        let (resolver, promise) = Promise::<u32>::pending();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            resolver.resolve(Ok(99));
        });
        assert_eq!(promise.await.unwrap(), 99);
    }

    #[test]
    fn test_debug_reports_state() {
        let (resolver, promise) = Promise::<u32>::pending();
        assert!(format!("{:?}", promise).contains("Pending"));
        resolver.resolve(Err(LoadError::DecodingFailed));
        assert!(format!("{:?}", promise).contains("decoding_failed"));
    }
}
