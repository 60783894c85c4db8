//! Shared counter stores for distributed admission.

use crate::{Clock, SystemClock};
use async_trait::async_trait;
use parking_lot::Mutex;
use sluice_error::RateLimitError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Key/value store of expiring integer counters.
///
/// Implementations wrap whatever shared store the deployment uses (Redis,
/// memcached, a database). Counters must be shared across every process that
/// enforces the same limit. Increments should be atomic; the limiter tolerates
/// the read-then-increment race by refusing on post-increment overshoot.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value, or zero when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<u64, RateLimitError>;

    /// Adds `by` to the counter, (re)setting its expiry to `ttl`, and returns
    /// the new value.
    async fn increment(&self, key: &str, by: u64, ttl: Duration) -> Result<u64, RateLimitError>;
}

/// Counter store held in process memory.
///
/// Clones share the same counters, which lets several limiters in one
/// process (or one test) stand in for separate broker instances.
#[derive(Debug, Clone)]
pub struct MemoryCounterStore {
    clock: Arc<dyn Clock>,
    counters: Arc<Mutex<HashMap<String, (u64, u64)>>>,
}

impl MemoryCounterStore {
    /// Store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Store on an explicit clock, used for expiry.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        self.counters
            .lock()
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    /// Whether no live keys remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<u64, RateLimitError> {
        let now = self.clock.now_ms();
        Ok(self
            .counters
            .lock()
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map_or(0, |(value, _)| *value))
    }

    async fn increment(&self, key: &str, by: u64, ttl: Duration) -> Result<u64, RateLimitError> {
        let now = self.clock.now_ms();
        let expires_at = now.saturating_add(ttl.as_millis() as u64);
        let mut counters = self.counters.lock();
        counters.retain(|_, (_, exp)| *exp > now);
        let entry = counters.entry(key.to_string()).or_insert((0, expires_at));
        entry.0 = entry.0.saturating_add(by);
        entry.1 = expires_at;
        Ok(entry.0)
    }
}
