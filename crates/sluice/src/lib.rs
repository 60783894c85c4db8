//! Sluice - rate-limited, prioritized access to shared provider APIs
//!
//! Sluice queues calls to external resources (LLM completions, embeddings,
//! vector stores) per resource, admits them through a fixed-window rate
//! limiter, and retries transient failures with exponential backoff.
//!
//! # Features
//!
//! - **Priority queues**: High, Normal and Low lanes per resource
//! - **Admission control**: request and cost budgets per window, in process or
//!   shared across processes through a counter store
//! - **Retries**: HTTP 408/429/5xx, network and timeout failures, honoring
//!   `Retry-After`
//! - **Backpressure**: bounded queues that reject instead of growing
//! - **Cancellation and graceful shutdown**
//! - **Typed wrappers** implementing the capability traits
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sluice::{
//!     InMemoryRateLimiter, LanguageModel, LanguageModelExecutor, QueuedLlm, ResourceBroker,
//!     ResourceConfig, SluiceConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     sluice::init_tracing()?;
//!
//!     let config = SluiceConfig::load()?;
//!     let broker = Arc::new(ResourceBroker::from_config(
//!         &config,
//!         Arc::new(InMemoryRateLimiter::new()),
//!     ));
//!
//!     let profile = config.resource("llm").ok_or("llm not configured")?;
//!     let executor = Arc::new(LanguageModelExecutor::new(Arc::new(my_model())));
//!     broker.register("llm", ResourceConfig::from_profile(&profile, executor))?;
//!
//!     let llm = QueuedLlm::new(broker.clone(), "llm");
//!     let text = llm.complete("Hello!", &Default::default()).await?;
//!     println!("{}", text);
//!
//!     broker.shutdown_with_default_timeout().await;
//!     Ok(())
//! }
//! ```
//!
//! # Cargo Features
//!
//! - `http` (default) - `Retry-After` header parsing and `reqwest` error
//!   conversion for provider errors
//!
//! # Architecture
//!
//! - `sluice_error` - Error types
//! - `sluice_core` - Requests, responses, limits and statistics
//! - `sluice_interface` - Executor and capability traits
//! - `sluice_rate_limit` - Rate limit backends and configuration
//! - `sluice_broker` - Broker, queues, retries and wrappers
//!
//! This crate (`sluice`) re-exports everything for convenience.

#![forbid(unsafe_code)]

pub use sluice_broker::*;
pub use sluice_core::*;
pub use sluice_error::*;
pub use sluice_interface::*;
pub use sluice_rate_limit::*;
