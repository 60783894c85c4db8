//! Error classification and exponential backoff.

use rand::Rng;
use sluice_core::RetryConfig;
use sluice_error::RetryableError;
use std::time::Duration;

/// How a failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClassification {
    /// Whether another attempt may succeed
    pub retryable: bool,
    /// Provider-supplied wait, honored instead of computed backoff
    pub retry_after: Option<Duration>,
}

/// Classifies a failure.
///
/// HTTP 408, 429 and 5xx, network errors and timeouts are retryable; other
/// 4xx, validation failures and executor panics are not. A `Retry-After`
/// hint is only carried for retryable errors.
pub fn classify_error<E>(error: &E) -> ErrorClassification
where
    E: RetryableError + ?Sized,
{
    let retryable = error.is_retryable();
    ErrorClassification {
        retryable,
        retry_after: if retryable { error.retry_after() } else { None },
    }
}

/// Delay before the retry following attempt `attempt` (zero-based).
///
/// `min(max_delay, base_delay * 2^attempt)` with symmetric jitter of
/// `± delay * jitter_ratio`. Never negative, and saturates instead of
/// overflowing for large attempts.
pub fn calculate_backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let delay = config
        .base_delay_ms
        .saturating_mul(factor)
        .min(config.max_delay_ms);

    let spread = delay as f64 * config.jitter_ratio.clamp(0.0, 1.0);
    if spread <= 0.0 {
        return Duration::from_millis(delay);
    }

    let offset = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_millis((delay as f64 + offset).max(0.0).round() as u64)
}

/// Whether a failed attempt should be retried.
pub fn should_retry<E>(attempt: u32, error: &E, config: &RetryConfig) -> bool
where
    E: RetryableError + ?Sized,
{
    classify_error(error).retryable && attempt < config.max_retries
}

/// Retry policy bound to one resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    /// Strategy for `config`.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Underlying policy.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// See [`should_retry`].
    pub fn should_retry<E>(&self, attempt: u32, error: &E) -> bool
    where
        E: RetryableError + ?Sized,
    {
        should_retry(attempt, error, &self.config)
    }

    /// Wait before re-queueing after `attempt` failed with `error`.
    pub fn delay_for<E>(&self, attempt: u32, error: &E) -> Duration
    where
        E: RetryableError + ?Sized,
    {
        classify_error(error)
            .retry_after
            .unwrap_or_else(|| calculate_backoff_delay(attempt, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_error::{ProviderError, ProviderErrorKind};

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            jitter_ratio: 0.0,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let config = no_jitter();
        assert_eq!(calculate_backoff_delay(0, &config), Duration::from_millis(1_000));
        assert_eq!(calculate_backoff_delay(1, &config), Duration::from_millis(2_000));
        assert_eq!(calculate_backoff_delay(4, &config), Duration::from_millis(16_000));
        assert_eq!(calculate_backoff_delay(5, &config), Duration::from_millis(30_000));
    }

    #[test]
    fn test_backoff_saturates_for_huge_attempts() {
        let config = no_jitter();
        assert_eq!(calculate_backoff_delay(63, &config), Duration::from_millis(30_000));
        assert_eq!(calculate_backoff_delay(64, &config), Duration::from_millis(30_000));
        assert_eq!(calculate_backoff_delay(u32::MAX, &config), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_stays_within_ratio() {
        let config = RetryConfig {
            jitter_ratio: 0.5,
            ..RetryConfig::default()
        };
        for _ in 0..200 {
            let delay = calculate_backoff_delay(1, &config).as_millis();
            assert!((1_000..=3_000).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_full_jitter_never_negative() {
        let config = RetryConfig {
            jitter_ratio: 1.0,
            ..RetryConfig::default()
        };
        for _ in 0..200 {
            assert!(calculate_backoff_delay(0, &config) <= Duration::from_millis(2_000));
        }
    }

    #[test]
    fn test_retry_after_ignored_for_permanent_errors() {
        let err = ProviderError::http(400, "bad").with_retry_after(Duration::from_secs(5));
        let classification = classify_error(&err);
        assert!(!classification.retryable);
        assert_eq!(classification.retry_after, None);
    }

    #[test]
    fn test_strategy_prefers_hint() {
        let strategy = RetryStrategy::new(no_jitter());
        let hinted = ProviderError::http(429, "slow").with_retry_after(Duration::from_millis(250));
        assert_eq!(strategy.delay_for(2, &hinted), Duration::from_millis(250));

        let plain = ProviderError::new(ProviderErrorKind::Timeout("read".to_string()));
        assert_eq!(strategy.delay_for(2, &plain), Duration::from_millis(4_000));
    }
}
