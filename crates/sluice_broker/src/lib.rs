//! Priority-queued, rate-limited access to shared resources.
//!
//! A [`ResourceBroker`] sits between callers and rate-limited providers such
//! as LLM, embedding or vector store APIs. Each registered resource has:
//!
//! - a [`PriorityQueue`] with High, Normal and Low lanes
//! - a worker task that admits queued work through a
//!   [`RateLimitBackend`](sluice_rate_limit::RateLimitBackend) and runs it on
//!   the resource's [`ResourceExecutor`](sluice_interface::ResourceExecutor)
//! - a [`RetryStrategy`] that re-queues transient failures with exponential
//!   backoff, honoring provider `Retry-After` hints
//!
//! Callers either build [`ResourceRequest`](sluice_core::ResourceRequest)s
//! directly or use the typed wrappers [`QueuedLlm`], [`QueuedEmbeddings`] and
//! [`QueuedVectorStore`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod config;
mod item;
mod queue;
mod retry;
mod worker;
mod wrappers;

pub use broker::ResourceBroker;
pub use config::{ResourceConfig, ResourceConfigBuilder};
pub use item::{PendingResponse, RequestId};
pub use queue::{Prioritized, PriorityQueue};
pub use retry::{
    ErrorClassification, RetryStrategy, calculate_backoff_delay, classify_error, should_retry,
};
pub use wrappers::{QueuedEmbeddings, QueuedLlm, QueuedVectorStore};
