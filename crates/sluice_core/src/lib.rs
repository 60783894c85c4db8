//! Core data types for the Sluice resource broker.
//!
//! This crate provides the request, response, limit and statistics types
//! shared by the rate limiting backends, the broker and its wrappers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod limits;
mod priority;
mod request;
mod response;
mod stats;
mod telemetry;

pub use limits::{AcquireResult, RateLimitConfig, RetryConfig};
pub use priority::Priority;
pub use request::{ResourceRequest, ResourceRequestBuilder};
pub use response::ResourceResponse;
pub use stats::{ResourceStats, StatsCounters};
pub use telemetry::{init_json_tracing, init_tracing};

/// Re-exported so callers can attach cancellation without naming `tokio_util`.
pub use tokio_util::sync::CancellationToken;
