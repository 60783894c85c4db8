//! The admission control contract.

use async_trait::async_trait;
use sluice_core::{AcquireResult, RateLimitConfig};

/// Decides whether a resource may spend more cost units now.
///
/// Implementations admit resources they have no limit for.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Install or replace the limit for a resource.
    fn configure(&self, resource: &str, limits: RateLimitConfig);

    /// Try to consume `cost` units (and one request) for `resource`.
    ///
    /// Never fails: backends that depend on remote state fall back to a
    /// local decision.
    async fn acquire(&self, resource: &str, cost: u64) -> AcquireResult;
}
