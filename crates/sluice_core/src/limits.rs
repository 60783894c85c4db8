//! Rate limit and retry configuration, and admission results.

use serde::{Deserialize, Serialize};
use sluice_error::ConfigError;
use std::time::Duration;

/// Static per-resource rate limit.
///
/// `requests_per_window` bounds request count; `cost_per_window`, when set,
/// additionally bounds cumulative cost units (for example tokens).
///
/// ```toml
/// [resources.llm]
/// requests_per_window = 60
/// window_ms = 60_000
/// cost_per_window = 90_000
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    pub requests_per_window: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Cost units admitted per window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_window: Option<u64>,
}

impl RateLimitConfig {
    /// Request-count limit only.
    pub fn new(requests_per_window: u32, window_ms: u64) -> Self {
        Self {
            requests_per_window,
            window_ms,
            cost_per_window: None,
        }
    }

    /// Adds a cost budget per window.
    pub fn with_cost_per_window(mut self, cost_per_window: u64) -> Self {
        self.cost_per_window = Some(cost_per_window);
        self
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Rejects limits that could never admit anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the request limit or window is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requests_per_window == 0 {
            return Err(ConfigError::new("requests_per_window must be greater than zero"));
        }
        if self.window_ms == 0 {
            return Err(ConfigError::new("window_ms must be greater than zero"));
        }
        if self.cost_per_window == Some(0) {
            return Err(ConfigError::new("cost_per_window must be greater than zero"));
        }
        Ok(())
    }
}

/// Retry policy for transient provider failures.
///
/// # Examples
///
/// ```
/// use sluice_core::RetryConfig;
///
/// let retry = RetryConfig::default();
/// assert_eq!(retry.max_retries, 3);
/// assert!(retry.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, doubled per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on the computed delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Symmetric jitter as a fraction of the delay, in [0, 1]
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ratio() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Validates delays and jitter ratio.
    ///
    /// # Errors
    ///
    /// Returns an error if `jitter_ratio` is outside [0, 1] or the base delay
    /// exceeds the cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ConfigError::new(format!(
                "jitter_ratio must be in [0.0, 1.0], got {}",
                self.jitter_ratio
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::new(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Answer to "may this resource spend `cost` more units right now?".
///
/// Produced fresh on every acquisition attempt; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireResult {
    /// Whether the units were granted
    pub allowed: bool,
    /// Units (or requests, whichever is tighter) left in the window
    pub remaining: u64,
    /// Wait before trying again when refused
    pub retry_after_ms: u64,
    /// Unix epoch milliseconds at which the window rolls over
    pub reset_at_ms: u64,
}

impl AcquireResult {
    /// Granted.
    pub fn allowed(remaining: u64, reset_at_ms: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_ms: 0,
            reset_at_ms,
        }
    }

    /// Refused until `retry_after_ms` has elapsed.
    pub fn denied(remaining: u64, retry_after_ms: u64, reset_at_ms: u64) -> Self {
        Self {
            allowed: false,
            remaining,
            retry_after_ms,
            reset_at_ms,
        }
    }

    /// Wait before trying again.
    pub fn retry_after(&self) -> Duration {
        Duration::from_millis(self.retry_after_ms)
    }
}
