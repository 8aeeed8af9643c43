//! Shared mock capabilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use fetchlayer::{
    CancellationToken, Decoder, Fetched, Fetcher, LoadError, LoadResult, Loader, Locator, Manager,
    ManagerConfig, MemoryCache, Metadata, MokaMemoryCache, ProgressSink, Transform, Value,
};

// ============================================================================
// Mock Fetcher
// ============================================================================

/// Decrements the active counter when a fetch ends, even if it is dropped.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fetcher that returns the locator bytes after a delay.
///
/// Locators starting with `fail://` produce a fetch error.
pub struct MockFetcher {
    delay: Duration,
    calls: AtomicUsize,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    tokens: Mutex<Vec<CancellationToken>>,
}

#[derive(Debug, thiserror::Error)]
#[error("host unreachable")]
pub struct Unreachable;

impl MockFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().clone()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(
        &self,
        locator: &Locator,
        token: CancellationToken,
        progress: ProgressSink,
    ) -> BoxFuture<'static, LoadResult<Fetched>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().push(token.clone());

        let active = Arc::clone(&self.active);
        let peak = Arc::clone(&self.peak);
        let delay = self.delay;
        let locator = locator.clone();

        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            let _guard = ActiveGuard(active);

            tokio::select! {
                _ = token.cancelled() => return Err(LoadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            if locator.as_str().starts_with("fail://") {
                return Err(LoadError::fetch(Unreachable));
            }
            let data = Bytes::copy_from_slice(locator.as_str().as_bytes());
            let len = data.len() as u64;
            progress.report(len / 2, len);
            progress.report(len, len);
            Ok(Fetched::new(data).with_metadata(Metadata::new().with("content-type", "text/plain")))
        }
        .boxed()
    }
}

// ============================================================================
// Mock Decoder and Transforms
// ============================================================================

/// Decodes UTF-8 text. Data starting with `bad` is rejected and data
/// starting with `panic` makes the decoder panic.
pub struct TextDecoder;

impl Decoder for TextDecoder {
    fn decode(&self, data: &Bytes, _metadata: &Metadata) -> Option<Value> {
        if data.starts_with(b"bad") {
            return None;
        }
        if data.starts_with(b"panic") {
            panic!("decoder invariant violated");
        }
        let text = String::from_utf8(data.to_vec()).ok()?;
        let cost = text.len();
        Some(Value::with_cost(text, cost))
    }
}

/// Upper-cases text.
pub struct Upper;

impl Transform for Upper {
    fn identifier(&self) -> &str {
        "upper"
    }

    fn transform(&self, value: Value) -> Option<Value> {
        let text = value.downcast_ref::<String>()?.to_uppercase();
        Some(Value::new(text))
    }
}

/// Always fails.
pub struct Broken;

impl Transform for Broken {
    fn identifier(&self) -> &str {
        "broken"
    }

    fn transform(&self, _value: Value) -> Option<Value> {
        None
    }
}

/// Panics on every value.
pub struct Exploding;

impl Transform for Exploding {
    fn identifier(&self) -> &str {
        "exploding"
    }

    fn transform(&self, _value: Value) -> Option<Value> {
        panic!("transform invariant violated");
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub struct Fixture {
    pub manager: Manager,
    pub fetcher: Arc<MockFetcher>,
    pub cache: Arc<MokaMemoryCache>,
}

/// Builds a manager over a [`Loader`] with a mock fetcher and a memory cache.
pub fn fixture(config: ManagerConfig, fetch_delay: Duration) -> Fixture {
    let fetcher = Arc::new(MockFetcher::new(fetch_delay));
    let cache = Arc::new(MokaMemoryCache::from_config(&config.memory_cache));
    let loader = Loader::from_config(
        &config,
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        Arc::new(TextDecoder),
        Some(Arc::clone(&cache) as Arc<dyn MemoryCache>),
        Handle::current(),
    );
    let manager = Manager::new(Arc::new(loader), &config);
    Fixture {
        manager,
        fetcher,
        cache,
    }
}

/// Test configuration with a short coalescing window.
pub fn test_config() -> ManagerConfig {
    ManagerConfig::default().with_preheat_coalesce_window(Duration::from_millis(2))
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Lets queued deliveries run.
pub fn settle() -> impl Future<Output = ()> {
    tokio::time::sleep(Duration::from_millis(30))
}
