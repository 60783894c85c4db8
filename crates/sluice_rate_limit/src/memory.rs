//! In-process fixed-window rate limiter.

use crate::{Clock, RateLimitBackend, SystemClock};
use async_trait::async_trait;
use parking_lot::Mutex;
use sluice_core::{AcquireResult, RateLimitConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Index of the window containing `now_ms` and the instant it rolls over.
pub(crate) fn window_bounds(now_ms: u64, window_ms: u64) -> (u64, u64) {
    let index = now_ms / window_ms;
    (index, (index + 1) * window_ms)
}

#[derive(Debug)]
struct WindowState {
    limits: RateLimitConfig,
    index: u64,
    requests: u64,
    cost: u64,
}

impl WindowState {
    fn new(limits: RateLimitConfig) -> Self {
        Self {
            limits,
            index: 0,
            requests: 0,
            cost: 0,
        }
    }

    fn roll(&mut self, index: u64) {
        if self.index != index {
            self.index = index;
            self.requests = 0;
            self.cost = 0;
        }
    }

    fn remaining(&self) -> u64 {
        let requests_left = u64::from(self.limits.requests_per_window).saturating_sub(self.requests);
        match self.limits.cost_per_window {
            Some(limit) => requests_left.min(limit.saturating_sub(self.cost)),
            None => requests_left,
        }
    }

    fn admits(&self, cost: u64) -> bool {
        let requests_ok = self.requests < u64::from(self.limits.requests_per_window);
        let cost_ok = self
            .limits
            .cost_per_window
            .is_none_or(|limit| self.cost.saturating_add(cost) <= limit);
        requests_ok && cost_ok
    }
}

/// Fixed-window counter per resource.
///
/// Windows are aligned to multiples of `window_ms` since the Unix epoch, so a
/// 60 000 ms window is minute-aligned. Within a window the limiter grants a
/// request only while both the request count and (when configured) the
/// cumulative cost stay within the limit; granted cost is never refunded.
///
/// # Example
///
/// ```rust,ignore
/// use sluice_core::RateLimitConfig;
/// use sluice_rate_limit::{InMemoryRateLimiter, RateLimitBackend};
///
/// let limiter = InMemoryRateLimiter::new();
/// limiter.configure("llm", RateLimitConfig::new(60, 60_000));
///
/// let result = limiter.acquire("llm", 1).await;
/// assert!(result.allowed);
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryRateLimiter {
    clock: Arc<dyn Clock>,
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl InMemoryRateLimiter {
    /// Limiter on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Limiter on an explicit clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Synchronous admission decision shared with the distributed fallback.
    pub(crate) fn try_acquire(&self, resource: &str, cost: u64) -> AcquireResult {
        let now = self.clock.now_ms();
        let mut windows = self.windows.lock();

        let Some(state) = windows.get_mut(resource) else {
            debug!(resource, "No rate limit configured for resource");
            return AcquireResult::allowed(u64::MAX, now);
        };

        let (index, reset_at) = window_bounds(now, state.limits.window_ms);
        state.roll(index);

        if state.admits(cost) {
            state.requests += 1;
            state.cost = state.cost.saturating_add(cost);
            let remaining = state.remaining();
            debug!(resource, cost, remaining, "Rate limit check passed");
            AcquireResult::allowed(remaining, reset_at)
        } else {
            let retry_after = reset_at - now;
            debug!(resource, cost, retry_after_ms = retry_after, "Rate limit exceeded");
            AcquireResult::denied(state.remaining(), retry_after, reset_at)
        }
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimiter {
    #[instrument(skip(self))]
    fn configure(&self, resource: &str, limits: RateLimitConfig) {
        debug!("Configuring in-memory rate limit");
        self.windows
            .lock()
            .insert(resource.to_string(), WindowState::new(limits));
    }

    async fn acquire(&self, resource: &str, cost: u64) -> AcquireResult {
        self.try_acquire(resource, cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds_align_to_epoch() {
        assert_eq!(window_bounds(0, 60_000), (0, 60_000));
        assert_eq!(window_bounds(59_999, 60_000), (0, 60_000));
        assert_eq!(window_bounds(60_000, 60_000), (1, 120_000));
    }

    #[test]
    fn test_remaining_takes_tighter_limit() {
        let mut state = WindowState::new(RateLimitConfig::new(10, 1_000).with_cost_per_window(5));
        state.requests = 1;
        state.cost = 4;
        assert_eq!(state.remaining(), 1);
        assert!(state.admits(1));
        assert!(!state.admits(2));
    }
}
