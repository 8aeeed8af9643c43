//! Integration tests for the task manager over the standard loader.
//!
//! These tests drive the full flow:
//! - Manager → Loader → fetch/decode/transform → memory cache
//! - Listener delivery ordering and exactly-once semantics
//! - Preheat deduplication and the concurrency ceiling
//! - Invalidation
//!
//! Run with: `cargo test --test manager_integration`

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use common::{fixture, settle, test_config, wait_until, Broken, Exploding, Upper};
use fetchlayer::{
    CachePolicy, LoadError, LoadPolicy, Metadata, Priority, Request, Response, SchedulerPolicy,
    TaskState,
};

const FAST: Duration = Duration::from_millis(5);
const SLOW: Duration = Duration::from_millis(60);
const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// End-to-end loads
// ============================================================================

#[tokio::test]
async fn test_load_then_instant_cache_hit() {
    let fx = fixture(test_config(), FAST);
    let request = Request::new("mem://tile/1").with_transform(Arc::new(Upper));

    let first = fx.manager.load(request.clone()).await;
    assert!(first.is_success());
    assert!(!first.from_cache());
    assert_eq!(
        first.value().unwrap().downcast_ref::<String>().unwrap(),
        "MEM://TILE/1"
    );
    assert_eq!(fx.fetcher.calls(), 1);

    // Resuming an equivalent request completes synchronously from cache.
    let task = fx.manager.task(request);
    fx.manager.resume(&task);
    assert_eq!(task.state(), TaskState::Completed);
    let response = task.response().unwrap();
    assert!(response.from_cache());
    assert!(response.is_fast());
    assert_eq!(fx.fetcher.calls(), 1);
    assert!(fx.manager.executing_tasks().is_empty());
}

#[tokio::test]
async fn test_cold_then_warm_load_reads_cache_once_each() {
    let fx = fixture(test_config(), FAST);
    let request = Request::new("mem://once");

    fx.manager.load(request.clone()).await;
    let stats = fx.cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 0);

    let response = fx.manager.load(request).await;
    assert!(response.from_cache());
    let stats = fx.cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_transform_identifier_separates_cache_entries() {
    let fx = fixture(test_config(), FAST);
    fx.manager.load(Request::new("mem://a")).await;
    let transformed = fx
        .manager
        .load(Request::new("mem://a").with_transform(Arc::new(Upper)))
        .await;

    assert!(!transformed.from_cache());
    assert_eq!(fx.fetcher.calls(), 2);
}

#[tokio::test]
async fn test_reload_policy_skips_cache() {
    let fx = fixture(test_config(), FAST);
    let request = Request::new("mem://reload");
    fx.manager.load(request.clone()).await;

    let response = fx
        .manager
        .load(request.with_load_policy(LoadPolicy::ReloadIgnoringCache))
        .await;
    assert!(!response.from_cache());
    assert_eq!(fx.fetcher.calls(), 2);
}

#[tokio::test]
async fn test_bypass_policy_never_caches() {
    let fx = fixture(test_config(), FAST);
    let request = Request::new("mem://bypass").with_cache_policy(CachePolicy::BYPASS);
    fx.manager.load(request.clone()).await;
    fx.manager.load(request).await;
    assert_eq!(fx.fetcher.calls(), 2);
    fx.cache.run_pending_tasks();
    assert_eq!(fx.cache.entry_count(), 0);
}

#[tokio::test]
async fn test_decode_failure() {
    let fx = fixture(test_config(), FAST);
    let response = fx.manager.load(Request::new("bad://data")).await;
    assert!(matches!(response.error(), Some(LoadError::DecodingFailed)));
}

#[tokio::test]
async fn test_transform_failure() {
    let fx = fixture(test_config(), FAST);
    let response = fx
        .manager
        .load(Request::new("mem://x").with_transform(Arc::new(Broken)))
        .await;
    assert!(matches!(response.error(), Some(LoadError::TransformFailed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_decoder_completes_with_decode_failure() {
    for policy in [SchedulerPolicy::Serial, SchedulerPolicy::Immediate] {
        let fx = fixture(test_config().with_decode_scheduler(policy), FAST);
        let task = fx.manager.task(Request::new("panic://decoder"));
        let (tx, rx) = oneshot::channel();
        fx.manager.add_completion(&task, move |response| {
            let _ = tx.send(response);
        });
        fx.manager.resume(&task);

        let response = tokio::time::timeout(TIMEOUT, rx).await.unwrap().unwrap();
        assert_eq!(task.state(), TaskState::Completed, "{} decoder", policy);
        assert!(matches!(response.error(), Some(LoadError::DecodingFailed)));
    }
}

#[tokio::test]
async fn test_panicking_transform_completes_with_transform_failure() {
    let fx = fixture(test_config(), FAST);
    let task = fx
        .manager
        .task(Request::new("mem://x").with_transform(Arc::new(Exploding)));
    let (tx, rx) = oneshot::channel();
    fx.manager.add_completion(&task, move |response| {
        let _ = tx.send(response);
    });
    fx.manager.resume(&task);

    let response = rx.await.unwrap();
    assert_eq!(task.state(), TaskState::Completed);
    assert!(matches!(response.error(), Some(LoadError::TransformFailed)));
}

#[tokio::test]
async fn test_fetch_error_passes_through() {
    let fx = fixture(test_config(), FAST);
    let response = fx.manager.load(Request::new("fail://host")).await;
    let err = response.error().unwrap();
    assert_eq!(err.kind(), "fetch");
    assert_eq!(err.fetch_source().unwrap().to_string(), "host unreachable");
}

#[tokio::test]
async fn test_user_info_reaches_response() {
    let fx = fixture(test_config(), FAST);
    let response = fx
        .manager
        .load(Request::new("mem://u").with_user_info(Metadata::new().with("cell", "7")))
        .await;
    assert_eq!(response.user_info().get("cell"), Some("7"));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_suspended_never_fetches() {
    let fx = fixture(test_config(), FAST);
    let task = fx.manager.task(Request::new("mem://never"));
    fx.manager.cancel(&task);
    fx.manager.resume(&task);
    settle().await;

    assert_eq!(task.state(), TaskState::Cancelled);
    assert_eq!(fx.fetcher.calls(), 0);
    assert!(task.response().unwrap().error().unwrap().is_cancelled());
}

#[tokio::test]
async fn test_cancel_running_cancels_token_once() {
    let fx = fixture(test_config(), SLOW);
    let task = fx.manager.task(Request::new("mem://slow"));
    let deliveries = Arc::new(Mutex::new(Vec::<Response>::new()));
    let sink = Arc::clone(&deliveries);
    fx.manager
        .add_completion(&task, move |response| sink.lock().push(response));

    fx.manager.resume(&task);
    assert!(wait_until(TIMEOUT, || fx.fetcher.calls() == 1).await);

    fx.manager.cancel(&task);
    fx.manager.cancel(&task);
    assert_eq!(task.state(), TaskState::Cancelled);
    assert!(fx.fetcher.tokens()[0].is_cancelled());

    tokio::time::sleep(SLOW * 2).await;
    let deliveries = deliveries.lock();
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].error().unwrap().is_cancelled());
    assert!(fx.manager.executing_tasks().is_empty());
}

// ============================================================================
// Listener delivery
// ============================================================================

#[tokio::test]
async fn test_listeners_called_once_in_order() {
    let fx = fixture(test_config(), FAST);
    let task = fx.manager.task(Request::new("mem://listeners"));
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
        let order = Arc::clone(&order);
        fx.manager
            .add_completion(&task, move |response| order.lock().push((i, response.is_fast())));
    }
    fx.manager.resume(&task);
    assert!(wait_until(TIMEOUT, || task.is_terminal()).await);

    for i in 3..5 {
        let order = Arc::clone(&order);
        fx.manager
            .add_completion(&task, move |response| order.lock().push((i, response.is_fast())));
    }
    settle().await;

    assert_eq!(
        *order.lock(),
        vec![(0, false), (1, false), (2, false), (3, true), (4, true)]
    );
}

#[tokio::test]
async fn test_progress_handler() {
    let fx = fixture(test_config(), FAST);
    let task = fx.manager.task(Request::new("mem://progress"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    fx.manager
        .set_progress_handler(&task, move |progress| sink.lock().push(progress));

    let (tx, rx) = oneshot::channel();
    fx.manager.add_completion(&task, move |_| {
        let _ = tx.send(());
    });
    fx.manager.resume(&task);
    rx.await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].completed < seen[1].completed);
    assert_eq!(seen[1].fraction(), Some(1.0));
    assert_eq!(task.progress(), seen[1]);
}

// ============================================================================
// Preheating
// ============================================================================

#[tokio::test]
async fn test_equivalent_preheat_requests_share_one_task() {
    let fx = fixture(test_config().with_max_concurrent_preheating_tasks(0), FAST);
    fx.manager.start_preheating(&[
        Request::new("mem://same"),
        Request::new("mem://same").with_user_info(Metadata::new().with("k", "v")),
    ]);
    fx.manager.start_preheating(&[Request::new("mem://same").with_priority(Priority::ON_DEMAND)]);

    let tasks = fx.manager.preheating_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].priority(), Priority::PREFETCH);
    assert!(tasks[0].is_preheat());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_preheat_respects_ceiling_and_all_terminate() {
    let fx = fixture(test_config().with_max_concurrent_preheating_tasks(2), SLOW);
    let requests: Vec<Request> = (0..10)
        .map(|i| Request::new(format!("mem://preheat/{}", i)))
        .collect();
    fx.manager.start_preheating(&requests);
    assert_eq!(fx.manager.preheating_tasks().len(), 10);

    let mut peak_running = 0;
    let done = wait_until(TIMEOUT, || {
        let running = fx
            .manager
            .preheating_tasks()
            .iter()
            .filter(|t| t.state() == TaskState::Running)
            .count();
        peak_running = peak_running.max(running);
        assert!(running <= 2, "{} preheat tasks running", running);
        fx.manager.preheating_tasks().is_empty()
    })
    .await;

    assert!(done, "preheating did not finish");
    assert!(peak_running >= 1);
    assert!(fx.fetcher.peak() <= 2);
    assert_eq!(fx.fetcher.calls(), 10);

    // Every preheated request is now a cache hit.
    let task = fx.manager.task(requests[9].clone());
    fx.manager.resume(&task);
    assert!(task.response().unwrap().from_cache());
}

#[tokio::test]
async fn test_on_demand_work_counts_against_preheat_ceiling() {
    let fx = fixture(test_config().with_max_concurrent_preheating_tasks(1), SLOW);
    let on_demand = fx.manager.task(Request::new("mem://user"));
    fx.manager.resume(&on_demand);

    fx.manager.start_preheating(&[Request::new("mem://background")]);
    tokio::time::sleep(SLOW / 3).await;
    assert_eq!(fx.manager.preheating_tasks()[0].state(), TaskState::Suspended);

    assert!(wait_until(TIMEOUT, || fx.manager.preheating_tasks().is_empty()).await);
    assert_eq!(on_demand.state(), TaskState::Completed);
}

#[tokio::test]
async fn test_stop_preheating_cancels_running_preheat() {
    let fx = fixture(test_config(), SLOW);
    let request = Request::new("mem://stop");
    fx.manager.start_preheating(&[request.clone()]);
    assert!(wait_until(TIMEOUT, || fx.fetcher.calls() == 1).await);

    let task = fx.manager.preheating_tasks()[0].clone();
    fx.manager.stop_preheating(&[request]);
    assert_eq!(task.state(), TaskState::Cancelled);
    assert!(fx.fetcher.tokens()[0].is_cancelled());
    assert!(fx.manager.preheating_tasks().is_empty());
}

// ============================================================================
// Invalidation
// ============================================================================

#[tokio::test]
async fn test_invalidate_cancels_everything() {
    let fx = fixture(test_config().with_max_concurrent_preheating_tasks(1), SLOW);
    let task = fx.manager.task(Request::new("mem://running"));
    let (tx, rx) = oneshot::channel();
    fx.manager.add_completion(&task, move |response| {
        let _ = tx.send(response);
    });
    fx.manager.resume(&task);
    fx.manager
        .start_preheating(&[Request::new("mem://p1"), Request::new("mem://p2")]);
    let preheats = fx.manager.preheating_tasks();

    fx.manager.invalidate_and_cancel();

    assert!(rx.await.unwrap().error().unwrap().is_cancelled());
    assert!(preheats.iter().all(|t| t.state() == TaskState::Cancelled));
    assert!(fx.manager.preheating_tasks().is_empty());
    assert!(fx.manager.executing_tasks().is_empty());

    // Later operations are ignored.
    let late = fx.manager.task(Request::new("mem://late"));
    fx.manager.resume(&late);
    assert_eq!(late.state(), TaskState::Suspended);
    let response = fx.manager.load(Request::new("mem://late2")).await;
    assert!(response.error().unwrap().is_cancelled());
    settle().await;
    assert_eq!(fx.fetcher.calls(), 1);
}
