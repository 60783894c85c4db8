//! Admission control for rate-limited resources.
//!
//! A [`RateLimitBackend`] answers "may resource R spend N more cost units
//! right now?". Two implementations share the contract:
//!
//! - [`InMemoryRateLimiter`] keeps fixed-window counters in process.
//! - [`DistributedRateLimiter`] keeps them in a shared [`CounterStore`] so
//!   several broker processes observe one limit, degrading to a conservative
//!   local decision when the store is unreachable.
//!
//! Cost is consumed at acquisition and never refunded, matching provider-side
//! accounting where failed calls still count against quota.
//!
//! [`SluiceConfig`] loads limits, retry policy and broker settings from TOML.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod clock;
mod config;
mod distributed;
mod memory;
mod store;

pub use backend::RateLimitBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BrokerSettings, ResourceProfile, ResourceSettings, RetryOverride, SluiceConfig};
pub use distributed::{DEFAULT_DEGRADED_SHARE, DEFAULT_STORE_TIMEOUT, DistributedRateLimiter};
pub use memory::InMemoryRateLimiter;
pub use store::{CounterStore, MemoryCounterStore};
