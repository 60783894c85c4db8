//! Rate limiter backed by a shared counter store.

use crate::memory::window_bounds;
use crate::{Clock, CounterStore, InMemoryRateLimiter, RateLimitBackend, SystemClock};
use async_trait::async_trait;
use parking_lot::Mutex;
use sluice_core::{AcquireResult, RateLimitConfig};
use sluice_error::{RateLimitError, RateLimitErrorKind};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Fraction of each limit the local fallback admits while the store is down.
pub const DEFAULT_DEGRADED_SHARE: f64 = 0.25;

/// Longest a single counter store call may take before it counts as a failure.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// Fixed-window limiter whose counters live in a [`CounterStore`].
///
/// Every broker process pointing at the same store observes one limit per
/// resource. Counters are keyed `ratelimit:<resource>:<window>` and
/// `ratelimit:<resource>:<window>:cost`, where `<window>` is the epoch-aligned
/// window index, and expire after one window length.
///
/// The check reads before it increments. Two processes can both pass the read;
/// the one whose increment overshoots the limit is refused, so the limit errs
/// toward under-admission.
///
/// When the store fails or a call outlives `store_timeout`, the limiter logs a warning and decides locally against
/// `degraded_share` of each limit (at least one request). Callers never see
/// store errors.
#[derive(Clone)]
pub struct DistributedRateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    limits: Arc<Mutex<HashMap<String, RateLimitConfig>>>,
    fallback: InMemoryRateLimiter,
    degraded_share: f64,
    store_timeout: Duration,
}

impl std::fmt::Debug for DistributedRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedRateLimiter")
            .field("clock", &self.clock)
            .field("limits", &self.limits)
            .field("degraded_share", &self.degraded_share)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl DistributedRateLimiter {
    /// Limiter over `store` on the system clock.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock::new()))
    }

    /// Limiter over `store` on an explicit clock.
    pub fn with_clock(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            fallback: InMemoryRateLimiter::with_clock(clock.clone()),
            clock,
            limits: Arc::new(Mutex::new(HashMap::new())),
            degraded_share: DEFAULT_DEGRADED_SHARE,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Sets the deadline for each counter store call. Zero keeps the default.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = if timeout.is_zero() {
            DEFAULT_STORE_TIMEOUT
        } else {
            timeout
        };
        self
    }

    /// Sets the degraded-mode share, clamped to (0, 1].
    ///
    /// Applies to resources configured afterwards.
    pub fn with_degraded_share(mut self, share: f64) -> Self {
        self.degraded_share = if share.is_finite() && share > 0.0 {
            share.min(1.0)
        } else {
            DEFAULT_DEGRADED_SHARE
        };
        self
    }

    /// Counter key for request counts.
    pub fn request_key(resource: &str, window_index: u64) -> String {
        format!("ratelimit:{}:{}", resource, window_index)
    }

    /// Counter key for cost units.
    pub fn cost_key(resource: &str, window_index: u64) -> String {
        format!("ratelimit:{}:{}:cost", resource, window_index)
    }

    fn degraded_limits(&self, limits: RateLimitConfig) -> RateLimitConfig {
        let scale = |value: u64| ((value as f64 * self.degraded_share).floor() as u64).max(1);
        RateLimitConfig {
            requests_per_window: scale(u64::from(limits.requests_per_window)) as u32,
            window_ms: limits.window_ms,
            cost_per_window: limits.cost_per_window.map(scale),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RateLimitError>>,
    ) -> Result<T, RateLimitError> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| {
                RateLimitError::new(RateLimitErrorKind::Store(format!(
                    "no reply within {} ms",
                    self.store_timeout.as_millis()
                )))
            })?
    }

    async fn acquire_shared(
        &self,
        resource: &str,
        limits: RateLimitConfig,
        cost: u64,
    ) -> Result<AcquireResult, RateLimitError> {
        let now = self.clock.now_ms();
        let (index, reset_at) = window_bounds(now, limits.window_ms);
        let retry_after = reset_at - now;
        let request_limit = u64::from(limits.requests_per_window);
        let request_key = Self::request_key(resource, index);
        let cost_key = Self::cost_key(resource, index);

        let remaining = |requests: u64, cost_used: u64| {
            let left = request_limit.saturating_sub(requests);
            match limits.cost_per_window {
                Some(limit) => left.min(limit.saturating_sub(cost_used)),
                None => left,
            }
        };

        let requests = self.bounded(self.store.get(&request_key)).await?;
        let cost_used = match limits.cost_per_window {
            Some(_) => self.bounded(self.store.get(&cost_key)).await?,
            None => 0,
        };

        let cost_fits = |used: u64| limits.cost_per_window.is_none_or(|limit| used <= limit);
        if requests >= request_limit || !cost_fits(cost_used.saturating_add(cost)) {
            debug!(resource, requests, cost_used, "Shared rate limit exceeded");
            return Ok(AcquireResult::denied(
                remaining(requests, cost_used),
                retry_after,
                reset_at,
            ));
        }

        let ttl = limits.window();
        let requests = self.bounded(self.store.increment(&request_key, 1, ttl)).await?;
        let cost_used = match limits.cost_per_window {
            Some(_) => self.bounded(self.store.increment(&cost_key, cost, ttl)).await?,
            None => 0,
        };

        if requests > request_limit || !cost_fits(cost_used) {
            debug!(resource, requests, cost_used, "Lost admission race on shared counter");
            return Ok(AcquireResult::denied(
                remaining(requests, cost_used),
                retry_after,
                reset_at,
            ));
        }

        Ok(AcquireResult::allowed(remaining(requests, cost_used), reset_at))
    }
}

#[async_trait]
impl RateLimitBackend for DistributedRateLimiter {
    #[instrument(skip(self))]
    fn configure(&self, resource: &str, limits: RateLimitConfig) {
        debug!(degraded_share = self.degraded_share, "Configuring shared rate limit");
        self.fallback
            .configure(resource, self.degraded_limits(limits));
        self.limits.lock().insert(resource.to_string(), limits);
    }

    async fn acquire(&self, resource: &str, cost: u64) -> AcquireResult {
        let limits = self.limits.lock().get(resource).copied();
        let Some(limits) = limits else {
            debug!(resource, "No rate limit configured for resource");
            return AcquireResult::allowed(u64::MAX, self.clock.now_ms());
        };

        match self.acquire_shared(resource, limits, cost).await {
            Ok(result) => result,
            Err(e) => {
                warn!(resource, error = %e, "Counter store unavailable, using degraded local limit");
                self.fallback.try_acquire(resource, cost)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCounterStore;

    #[test]
    fn test_degraded_limits_keep_at_least_one() {
        let limiter = DistributedRateLimiter::new(Arc::new(MemoryCounterStore::new()));
        let scaled = limiter.degraded_limits(RateLimitConfig::new(2, 1_000).with_cost_per_window(100));
        assert_eq!(scaled.requests_per_window, 1);
        assert_eq!(scaled.cost_per_window, Some(25));

        let half = limiter
            .with_degraded_share(0.5)
            .degraded_limits(RateLimitConfig::new(10, 1_000));
        assert_eq!(half.requests_per_window, 5);
    }

    #[test]
    fn test_counter_keys() {
        assert_eq!(DistributedRateLimiter::request_key("llm", 42), "ratelimit:llm:42");
        assert_eq!(DistributedRateLimiter::cost_key("llm", 42), "ratelimit:llm:42:cost");
    }
}
