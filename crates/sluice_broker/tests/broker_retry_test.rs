//! Tests for retry behaviour driven through the broker.

use serde_json::{Value as JsonValue, json};
use sluice_broker::{ResourceBroker, ResourceConfig};
use sluice_core::{RateLimitConfig, ResourceRequest, RetryConfig};
use sluice_error::{ProviderError, ProviderErrorKind};
use sluice_interface::{ResourceExecutor, executor_fn};
use sluice_rate_limit::InMemoryRateLimiter;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

fn retry_config(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay_ms: 100,
        max_delay_ms: 1_000,
        jitter_ratio: 0.0,
    }
}

/// Fails with `error` for the first `failures` calls, then succeeds.
fn flaky_executor(
    calls: Arc<AtomicU32>,
    failures: u32,
    error: ProviderError,
) -> Arc<dyn ResourceExecutor> {
    executor_fn(move |_op: String, _args: Vec<JsonValue>| {
        let calls = calls.clone();
        let error = error.clone();
        async move {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if call < failures {
                Err(error)
            } else {
                Ok(json!("done"))
            }
        }
    })
}

fn register(executor: Arc<dyn ResourceExecutor>, retry: RetryConfig) -> ResourceBroker {
    let broker = ResourceBroker::new(Arc::new(InMemoryRateLimiter::new()));
    let config = ResourceConfig::builder()
        .rate_limits(RateLimitConfig::new(1_000, 60_000))
        .executor(executor)
        .retry(retry)
        .build()
        .unwrap();
    broker.register("llm", config).unwrap();
    broker
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_responses_retry_until_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let broker = register(
        flaky_executor(calls.clone(), 3, ProviderError::http(429, "slow down")),
        retry_config(5),
    );

    let started = Instant::now();
    let response = broker
        .submit(ResourceRequest::new("llm", "complete", vec![]))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.attempt, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // 100 + 200 + 400 ms of backoff.
    assert!(started.elapsed() >= Duration::from_millis(700));

    let stats = broker.get_stats("llm").unwrap();
    assert_eq!(stats.retried, 3);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.queued, 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_fails_after_one_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let broker = register(
        flaky_executor(calls.clone(), u32::MAX, ProviderError::http(400, "bad request")),
        retry_config(5),
    );

    let response = broker
        .submit(ResourceRequest::new("llm", "complete", vec![]))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.attempt, 0);
    assert_eq!(response.error.unwrap().status(), Some(400));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = broker.get_stats("llm").unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retried, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_reports_last_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let broker = register(
        flaky_executor(calls.clone(), u32::MAX, ProviderError::http(503, "unavailable")),
        retry_config(2),
    );

    let response = broker
        .submit(ResourceRequest::new("llm", "complete", vec![]))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.attempt, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(response.into_result().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_hint_is_honored() {
    let calls = Arc::new(AtomicU32::new(0));
    let broker = register(
        flaky_executor(
            calls.clone(),
            1,
            ProviderError::http(429, "slow down").with_retry_after(Duration::from_secs(5)),
        ),
        retry_config(3),
    );

    let started = Instant::now();
    let response = broker
        .submit(ResourceRequest::new("llm", "complete", vec![]))
        .await
        .unwrap();

    assert!(response.success);
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_network_errors_are_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let broker = register(
        flaky_executor(
            calls.clone(),
            1,
            ProviderError::new(ProviderErrorKind::Network("reset".to_string())),
        ),
        retry_config(1),
    );

    let response = broker
        .submit(ResourceRequest::new("llm", "complete", vec![]))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.attempt, 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_executor_is_contained() {
    let executor = executor_fn(|operation: String, _args: Vec<JsonValue>| async move {
        if operation == "explode" {
            panic!("executor bug");
        }
        Ok(json!("fine"))
    });
    let broker = register(executor, retry_config(3));

    let response = broker
        .submit(ResourceRequest::new("llm", "explode", vec![]))
        .await
        .unwrap();
    assert!(!response.success);
    assert!(matches!(
        response.error.unwrap().kind(),
        ProviderErrorKind::ExecutorPanicked(_)
    ));

    // The worker survives and keeps serving.
    let response = broker
        .submit(ResourceRequest::new("llm", "complete", vec![]))
        .await
        .unwrap();
    assert!(response.success);

    let stats = broker.get_stats("llm").unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.active, 0);
}
