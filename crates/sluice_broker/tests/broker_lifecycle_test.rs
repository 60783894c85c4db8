//! Tests for cancellation and shutdown.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use sluice_broker::{ResourceBroker, ResourceConfig};
use sluice_core::{CancellationToken, RateLimitConfig, ResourceRequest};
use sluice_error::{BrokerErrorKind, RateLimitError, SluiceErrorKind};
use sluice_interface::{ResourceExecutor, executor_fn};
use sluice_rate_limit::{
    CounterStore, DistributedRateLimiter, InMemoryRateLimiter, ManualClock, RateLimitBackend,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Logs operations; "blocker" waits on `gate`, "slow" sleeps ten seconds.
fn executor(log: Arc<Mutex<Vec<String>>>, gate: Arc<Notify>) -> Arc<dyn ResourceExecutor> {
    executor_fn(move |operation: String, _args: Vec<JsonValue>| {
        let log = log.clone();
        let gate = gate.clone();
        async move {
            log.lock().push(operation.clone());
            match operation.as_str() {
                "blocker" => gate.notified().await,
                "slow" => tokio::time::sleep(Duration::from_secs(10)).await,
                _ => {}
            }
            Ok(json!(operation))
        }
    })
}

fn setup(
    backend: Arc<dyn RateLimitBackend>,
    limits: RateLimitConfig,
) -> (ResourceBroker, Arc<Mutex<Vec<String>>>, Arc<Notify>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Notify::new());
    let broker = ResourceBroker::new(backend);
    let config = ResourceConfig::builder()
        .rate_limits(limits)
        .executor(executor(log.clone(), gate.clone()))
        .build()
        .unwrap();
    broker.register("llm", config).unwrap();
    (broker, log, gate)
}

fn generous_setup() -> (ResourceBroker, Arc<Mutex<Vec<String>>>, Arc<Notify>) {
    setup(
        Arc::new(InMemoryRateLimiter::new()),
        RateLimitConfig::new(1_000, 60_000),
    )
}

fn cancellable(operation: &str, token: &CancellationToken) -> ResourceRequest {
    ResourceRequest::builder()
        .resource("llm")
        .operation(operation)
        .cancel_token(token.clone())
        .build()
        .unwrap()
}

async fn wait_until_active(broker: &ResourceBroker) {
    while broker.get_stats("llm").unwrap().active == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancelling_queued_request_skips_executor() {
    let (broker, log, gate) = generous_setup();

    let blocker = broker
        .enqueue(ResourceRequest::new("llm", "blocker", vec![]))
        .unwrap();
    wait_until_active(&broker).await;

    let token = CancellationToken::new();
    let pending = broker.enqueue(cancellable("victim", &token)).unwrap();
    token.cancel();

    let err = pending.await.unwrap_err();
    assert_eq!(err.kind(), &BrokerErrorKind::Cancelled);

    gate.notify_one();
    blocker.await.unwrap();

    assert_eq!(*log.lock(), vec!["blocker"]);
    let stats = broker.get_stats("llm").unwrap();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelling_executing_request_aborts_it() {
    let (broker, _log, _gate) = generous_setup();

    let token = CancellationToken::new();
    let pending = broker.enqueue(cancellable("slow", &token)).unwrap();
    wait_until_active(&broker).await;

    token.cancel();
    let err = pending.await.unwrap_err();
    assert_eq!(err.kind(), &BrokerErrorKind::Cancelled);

    let stats = broker.get_stats("llm").unwrap();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.succeeded, 0);

    // The resource is free for the next request.
    let response = broker
        .submit(ResourceRequest::new("llm", "quick", vec![]))
        .await
        .unwrap();
    assert!(response.success);
}

#[tokio::test(start_paused = true)]
async fn test_already_cancelled_request_is_rejected() {
    let (broker, log, _gate) = generous_setup();

    let token = CancellationToken::new();
    token.cancel();
    let err = broker.enqueue(cancellable("never", &token)).unwrap_err();
    assert_eq!(err.kind(), &BrokerErrorKind::Cancelled);
    assert!(log.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_completion_is_harmless() {
    let (broker, _log, _gate) = generous_setup();

    let token = CancellationToken::new();
    let response = broker
        .submit(cancellable("quick", &token))
        .await
        .unwrap();
    assert!(response.success);

    token.cancel();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let stats = broker.get_stats("llm").unwrap();
    assert_eq!(stats.cancelled, 0);
    assert_eq!(stats.succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_rejects_starved_item_at_deadline() {
    // Frozen clock at the start of a window: the second request can never be admitted.
    let clock = ManualClock::new(60_000 * 1_000);
    let (broker, _log, _gate) = setup(
        Arc::new(InMemoryRateLimiter::with_clock(Arc::new(clock))),
        RateLimitConfig::new(1, 60_000),
    );

    assert!(
        broker
            .submit(ResourceRequest::new("llm", "first", vec![]))
            .await
            .unwrap()
            .success
    );
    let starved = broker
        .enqueue(ResourceRequest::new("llm", "second", vec![]))
        .unwrap();

    let started = Instant::now();
    broker.shutdown(Duration::from_millis(1_000)).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1_000));
    assert!(elapsed < Duration::from_millis(1_100));

    let err = starved.await.unwrap_err();
    assert_eq!(err.kind(), &BrokerErrorKind::ShutdownTimeout);

    let stats = broker.get_stats("llm").unwrap();
    assert_eq!(stats.queued, 0);
    assert!(stats.rate_limited >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_queued_work() {
    let (broker, log, _gate) = generous_setup();

    let pending: Vec<_> = ["slow", "a", "b"]
        .iter()
        .map(|op| broker.enqueue(ResourceRequest::new("llm", *op, vec![])).unwrap())
        .collect();

    broker.shutdown(Duration::from_secs(60)).await;

    for p in pending {
        assert!(p.await.unwrap().success);
    }
    assert_eq!(*log.lock(), vec!["slow", "a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_executing_item_at_deadline() {
    let (broker, _log, _gate) = generous_setup();

    let pending = broker
        .enqueue(ResourceRequest::new("llm", "blocker", vec![]))
        .unwrap();
    wait_until_active(&broker).await;

    broker.shutdown(Duration::from_millis(500)).await;

    let err = pending.await.unwrap_err();
    assert_eq!(err.kind(), &BrokerErrorKind::ShutdownTimeout);
    assert_eq!(broker.get_stats("llm").unwrap().active, 0);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_and_register_after_shutdown_fail() {
    let (broker, _log, gate) = generous_setup();
    broker.shutdown(Duration::from_secs(1)).await;
    assert!(broker.is_shutting_down());

    let err = broker
        .enqueue(ResourceRequest::new("llm", "late", vec![]))
        .unwrap_err();
    assert_eq!(err.kind(), &BrokerErrorKind::ShuttingDown);

    let config = ResourceConfig::builder()
        .rate_limits(RateLimitConfig::new(1, 1_000))
        .executor(executor(Arc::new(Mutex::new(Vec::new())), gate))
        .build()
        .unwrap();
    let err = broker.register("embeddings", config).unwrap_err();
    assert!(matches!(err.kind(), SluiceErrorKind::Broker(_)));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_shutdown_calls_all_complete() {
    let (broker, _log, _gate) = generous_setup();
    let broker = Arc::new(broker);

    let pending = broker
        .enqueue(ResourceRequest::new("llm", "slow", vec![]))
        .unwrap();

    let first = tokio::spawn({
        let broker = broker.clone();
        async move { broker.shutdown(Duration::from_secs(30)).await }
    });
    let second = tokio::spawn({
        let broker = broker.clone();
        async move { broker.shutdown(Duration::from_secs(30)).await }
    });
    first.await.unwrap();
    second.await.unwrap();
    broker.shutdown_with_default_timeout().await;

    assert!(pending.await.unwrap().success);
}

/// Counter store whose calls never return.
struct StalledStore;

#[async_trait]
impl CounterStore for StalledStore {
    async fn get(&self, _key: &str) -> Result<u64, RateLimitError> {
        std::future::pending().await
    }

    async fn increment(&self, _key: &str, _by: u64, _ttl: Duration) -> Result<u64, RateLimitError> {
        std::future::pending().await
    }
}

fn stalled_setup() -> (ResourceBroker, Arc<Mutex<Vec<String>>>, Arc<Notify>) {
    let limiter = DistributedRateLimiter::new(Arc::new(StalledStore))
        .with_store_timeout(Duration::from_secs(24 * 60 * 60));
    setup(Arc::new(limiter), RateLimitConfig::new(10, 60_000))
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_deadline_holds_while_limiter_is_stalled() {
    let (broker, log, _gate) = stalled_setup();

    let pending = broker
        .enqueue(ResourceRequest::new("llm", "stuck", vec![]))
        .unwrap();

    let started = Instant::now();
    tokio::time::timeout(
        Duration::from_secs(60),
        broker.shutdown(Duration::from_millis(1_000)),
    )
    .await
    .expect("shutdown should return at its deadline");
    assert!(started.elapsed() < Duration::from_secs(2));

    let err = pending.await.unwrap_err();
    assert_eq!(err.kind(), &BrokerErrorKind::ShutdownTimeout);
    assert!(log.lock().is_empty());
    assert_eq!(broker.get_stats("llm").unwrap().queued, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_honoured_while_limiter_is_stalled() {
    let (broker, log, _gate) = stalled_setup();

    let head_token = CancellationToken::new();
    let head = broker.enqueue(cancellable("head", &head_token)).unwrap();
    let next_token = CancellationToken::new();
    let next = broker.enqueue(cancellable("next", &next_token)).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    next_token.cancel();
    let err = tokio::time::timeout(Duration::from_secs(60), next)
        .await
        .expect("queued request should resolve once cancelled")
        .unwrap_err();
    assert_eq!(err.kind(), &BrokerErrorKind::Cancelled);

    head_token.cancel();
    let err = tokio::time::timeout(Duration::from_secs(60), head)
        .await
        .expect("request awaiting admission should resolve once cancelled")
        .unwrap_err();
    assert_eq!(err.kind(), &BrokerErrorKind::Cancelled);

    assert!(log.lock().is_empty());
    let stats = broker.get_stats("llm").unwrap();
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.cancelled, 2);
}
