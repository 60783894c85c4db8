//! Tests for error classification and backoff.

use sluice_broker::{ErrorClassification, calculate_backoff_delay, classify_error, should_retry};
use sluice_core::RetryConfig;
use sluice_error::{ProviderError, ProviderErrorKind};
use std::time::Duration;

fn config() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        base_delay_ms: 100,
        max_delay_ms: 1_000,
        jitter_ratio: 0.0,
    }
}

#[test]
fn test_backoff_sequence_without_jitter() {
    let delays: Vec<u64> = (0..7)
        .map(|attempt| calculate_backoff_delay(attempt, &config()).as_millis() as u64)
        .collect();
    assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000, 1_000]);
}

#[test]
fn test_classification_by_status() {
    for status in [408, 429, 500, 502, 503, 504] {
        assert!(
            classify_error(&ProviderError::http(status, "x")).retryable,
            "status {} should retry",
            status
        );
    }
    for status in [400, 401, 403, 404, 422] {
        assert!(
            !classify_error(&ProviderError::http(status, "x")).retryable,
            "status {} should not retry",
            status
        );
    }
}

#[test]
fn test_classification_by_kind() {
    let retryable = [
        ProviderErrorKind::Network("reset".to_string()),
        ProviderErrorKind::Timeout("read".to_string()),
    ];
    for kind in retryable {
        assert!(classify_error(&ProviderError::new(kind)).retryable);
    }

    let permanent = [
        ProviderErrorKind::Validation("bad args".to_string()),
        ProviderErrorKind::ExecutorPanicked("boom".to_string()),
        ProviderErrorKind::Other("unknown".to_string()),
    ];
    for kind in permanent {
        assert!(!classify_error(&ProviderError::new(kind)).retryable);
    }
}

#[test]
fn test_rate_limit_hint_is_carried() {
    let err = ProviderError::http(429, "slow down").with_retry_after(Duration::from_secs(2));
    assert_eq!(
        classify_error(&err),
        ErrorClassification {
            retryable: true,
            retry_after: Some(Duration::from_secs(2)),
        }
    );
}

#[test]
fn test_should_retry_respects_max_retries() {
    let err = ProviderError::http(503, "unavailable");
    assert!(should_retry(0, &err, &config()));
    assert!(should_retry(2, &err, &config()));
    assert!(!should_retry(3, &err, &config()));

    let permanent = ProviderError::http(400, "bad");
    assert!(!should_retry(0, &permanent, &config()));
}
