//! Error types for the Sluice resource broker.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! `SluiceError` collects every domain so callers can use `?` across crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod builder;
mod config;
mod error;
mod json;
mod provider;
mod rate_limit;

pub use broker::{BrokerError, BrokerErrorKind};
pub use builder::{BuilderError, BuilderErrorKind};
pub use config::ConfigError;
pub use error::{SluiceError, SluiceErrorKind, SluiceResult};
pub use json::JsonError;
#[cfg(feature = "http")]
pub use provider::retry_after_from_headers;
pub use provider::{ProviderError, ProviderErrorKind, RetryableError};
pub use rate_limit::{RateLimitError, RateLimitErrorKind};
