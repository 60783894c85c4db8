//! Provider failures reported by resource executors, and retry classification.

use std::time::Duration;

/// Provider failure conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ProviderErrorKind {
    /// HTTP error with status code and message
    #[display("HTTP {} error: {}", status, message)]
    Http {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },
    /// Connection-level failure before a response arrived
    #[display("Network error: {}", _0)]
    Network(String),
    /// The call did not complete in time
    #[display("Request timed out: {}", _0)]
    Timeout(String),
    /// The request itself is malformed
    #[display("Invalid request: {}", _0)]
    Validation(String),
    /// The executor panicked while handling the request
    #[display("Executor panicked: {}", _0)]
    ExecutorPanicked(String),
    /// Anything else the executor reports
    #[display("{}", _0)]
    Other(String),
}

impl ProviderErrorKind {
    /// Check if this error type should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderErrorKind::Http { status, .. } => {
                matches!(*status, 408 | 429) || (500..=599).contains(status)
            }
            ProviderErrorKind::Network(_) => true,
            ProviderErrorKind::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Provider error with source location tracking and an optional server
/// supplied retry hint.
///
/// # Examples
///
/// ```
/// use sluice_error::{ProviderError, RetryableError};
/// use std::time::Duration;
///
/// let err = ProviderError::http(429, "Too Many Requests")
///     .with_retry_after(Duration::from_secs(2));
///
/// assert!(err.is_retryable());
/// assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
/// assert!(!ProviderError::http(400, "bad prompt").is_retryable());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Provider Error: {} at line {} in {}", kind, line, file)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    retry_after: Option<Duration>,
    line: u32,
    file: &'static str,
}

impl ProviderError {
    /// Create a new ProviderError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ProviderErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            retry_after: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Shorthand for an HTTP status failure.
    #[track_caller]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Http {
            status,
            message: message.into(),
        })
    }

    /// Attach a server supplied `Retry-After` hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ProviderErrorKind {
        &self.kind
    }

    /// HTTP status code, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            ProviderErrorKind::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for HTTP 429 responses.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

#[cfg(feature = "http")]
impl ProviderError {
    /// Build an error from a failed HTTP response.
    ///
    /// Honors `retry-after-ms` (milliseconds) and `retry-after` (whole
    /// seconds) headers, preferring the more precise one.
    #[track_caller]
    pub fn from_response(
        status: u16,
        headers: &reqwest::header::HeaderMap,
        message: impl Into<String>,
    ) -> Self {
        let err = Self::http(status, message);
        match retry_after_from_headers(headers) {
            Some(delay) => err.with_retry_after(delay),
            None => err,
        }
    }
}

/// Parse a retry hint from response headers.
#[cfg(feature = "http")]
pub fn retry_after_from_headers(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    if let Some(ms) = parse_header_u64(headers, "retry-after-ms") {
        return Some(Duration::from_millis(ms));
    }
    parse_header_u64(headers, "retry-after").map(Duration::from_secs)
}

#[cfg(feature = "http")]
fn parse_header_u64(headers: &reqwest::header::HeaderMap, key: &str) -> Option<u64> {
    headers.get(key)?.to_str().ok()?.trim().parse().ok()
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for ProviderError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout(message)
        } else if let Some(status) = err.status() {
            ProviderErrorKind::Http {
                status: status.as_u16(),
                message,
            }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            ProviderErrorKind::Network(message)
        } else if err.is_builder() {
            ProviderErrorKind::Validation(message)
        } else {
            ProviderErrorKind::Other(message)
        };
        Self::new(kind)
    }
}

/// Trait for errors that support retry logic.
///
/// The broker's error classifier consults this trait to decide whether a
/// failed execution goes back to the queue.
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    ///
    /// Transient errors like 503 (service unavailable), 429 (rate limit),
    /// or network timeouts should return true. Permanent errors like 401
    /// (unauthorized) or 400 (bad request) should return false.
    fn is_retryable(&self) -> bool;

    /// Server mandated delay before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for ProviderError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}
