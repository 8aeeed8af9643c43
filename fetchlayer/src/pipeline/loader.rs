//! Standard pipeline implementation.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, instrument};

use super::stages::{cache_stage, check_memory_cache, decode_stage, fetch_stage, transform_stage};
use super::{Decoder, Fetcher, Loaded, Pipeline, ProgressSink};
use crate::cache::MemoryCache;
use crate::cancel::{checkpoint, CancellationToken};
use crate::config::ManagerConfig;
use crate::error::LoadResult;
use crate::key::{CacheKey, DefaultEquivalence, RequestEquivalence};
use crate::policy::SchedulerPolicy;
use crate::promise::Promise;
use crate::request::Request;
use crate::scheduler::{self, Scheduler};

/// Pipeline assembled from a fetcher, a decoder, an optional memory cache
/// and one scheduler per processing stage.
///
/// # Example
///
/// ```ignore
/// let loader = Loader::new(Arc::new(HttpFetcher::new()), Arc::new(PngDecoder), Handle::current())
///     .with_cache(Arc::new(MokaMemoryCache::new(64 * 1024 * 1024, None)))
///     .with_transform_scheduler(SchedulerPolicy::parallel(4));
/// ```
#[derive(Clone)]
pub struct Loader {
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder>,
    cache: Option<Arc<dyn MemoryCache>>,
    decode_scheduler: Arc<dyn Scheduler>,
    transform_scheduler: Arc<dyn Scheduler>,
    equivalence: Arc<dyn RequestEquivalence>,
    runtime: Handle,
}

impl Loader {
    /// Creates a loader with no cache, a serial decode scheduler, an
    /// immediate transform scheduler and [`DefaultEquivalence`].
    pub fn new(fetcher: Arc<dyn Fetcher>, decoder: Arc<dyn Decoder>, runtime: Handle) -> Self {
        Self {
            fetcher,
            decoder,
            cache: None,
            decode_scheduler: scheduler::from_policy(
                SchedulerPolicy::Serial,
                "decode",
                runtime.clone(),
            ),
            transform_scheduler: scheduler::from_policy(
                SchedulerPolicy::Immediate,
                "transform",
                runtime.clone(),
            ),
            equivalence: Arc::new(DefaultEquivalence),
            runtime,
        }
    }

    /// Creates a loader whose schedulers follow `config`.
    pub fn from_config(
        config: &ManagerConfig,
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn Decoder>,
        cache: Option<Arc<dyn MemoryCache>>,
        runtime: Handle,
    ) -> Self {
        let mut loader = Self::new(fetcher, decoder, runtime)
            .with_decode_scheduler(config.decode_scheduler)
            .with_transform_scheduler(config.transform_scheduler);
        loader.cache = cache;
        loader
    }

    /// Attaches a memory cache.
    pub fn with_cache(mut self, cache: Arc<dyn MemoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replaces the decode scheduler.
    pub fn with_decode_scheduler(mut self, policy: SchedulerPolicy) -> Self {
        self.decode_scheduler = scheduler::from_policy(policy, "decode", self.runtime.clone());
        self
    }

    /// Replaces the transform scheduler.
    pub fn with_transform_scheduler(mut self, policy: SchedulerPolicy) -> Self {
        self.transform_scheduler =
            scheduler::from_policy(policy, "transform", self.runtime.clone());
        self
    }

    /// Replaces the equivalence strategy.
    pub fn with_equivalence(mut self, equivalence: Arc<dyn RequestEquivalence>) -> Self {
        self.equivalence = equivalence;
        self
    }

    /// The memory cache, if any.
    pub fn cache(&self) -> Option<&Arc<dyn MemoryCache>> {
        self.cache.as_ref()
    }

    /// The decode stage scheduler.
    pub fn decode_scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.decode_scheduler
    }

    /// The transform stage scheduler.
    pub fn transform_scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.transform_scheduler
    }

    /// Runs stages two through five.
    #[instrument(skip_all, fields(locator = %request.locator()))]
    async fn run(
        self,
        request: Request,
        key: CacheKey,
        token: CancellationToken,
        progress: ProgressSink,
    ) -> LoadResult<Loaded> {
        checkpoint(&token)?;
        let fetched =
            fetch_stage(Arc::clone(&self.fetcher), request.locator(), token.clone(), progress)
                .await?;

        checkpoint(&token)?;
        let value = decode_stage(
            self.decode_scheduler.as_ref(),
            &token,
            Arc::clone(&self.decoder),
            fetched.data,
            fetched.metadata.clone(),
        )
        .await?;

        checkpoint(&token)?;
        let value = transform_stage(
            self.transform_scheduler.as_ref(),
            &token,
            request.transform().cloned(),
            value,
        )
        .await?;

        checkpoint(&token)?;
        let loaded = Loaded {
            value,
            metadata: fetched.metadata,
            from_cache: false,
        };
        if let Some(cache) = &self.cache {
            cache_stage(&request, key, &loaded, Arc::clone(cache));
        }

        debug!("Pipeline complete");
        Ok(loaded)
    }
}

impl Pipeline for Loader {
    fn load(
        &self,
        request: &Request,
        token: CancellationToken,
        progress: ProgressSink,
    ) -> Promise<Loaded> {
        if let Err(err) = checkpoint(&token) {
            return Promise::err(err);
        }

        // Stage 1 runs on the caller so a hit settles synchronously.
        if let Some(hit) = self.cached(request) {
            return Promise::ok(hit);
        }

        let key = self.cache_key(request);
        let (resolver, promise) = Promise::pending();
        let loader = self.clone();
        let request = request.clone();
        self.runtime.spawn(async move {
            let result = loader.run(request, key, token, progress).await;
            resolver.resolve(result);
        });
        promise
    }

    fn cached(&self, request: &Request) -> Option<Loaded> {
        let cache = self.cache.as_ref()?;
        check_memory_cache(request, &self.cache_key(request), cache.as_ref())
    }

    fn equivalence(&self) -> Arc<dyn RequestEquivalence> {
        Arc::clone(&self.equivalence)
    }
}
