//! Broker admission and delivery errors.

/// Broker error conditions.
///
/// `UnknownResource`, `QueueFull`, `ShuttingDown` and `CostExceedsLimit` are
/// returned directly from `enqueue`. The remaining kinds are delivered through
/// the pending response future.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum BrokerErrorKind {
    /// No resource registered under this name
    #[display("Unknown resource: {}", _0)]
    UnknownResource(String),
    /// The resource queue is at its hard cap
    #[display("Queue for '{}' is full ({} pending)", resource, capacity)]
    QueueFull {
        /// Resource name
        resource: String,
        /// Configured queue capacity
        capacity: usize,
    },
    /// The request can never fit in a single rate-limit window
    #[display("Request cost {} exceeds the per-window budget {} of '{}'", cost, limit, resource)]
    CostExceedsLimit {
        /// Resource name
        resource: String,
        /// Estimated cost of the request
        cost: u64,
        /// Configured cost per window
        limit: u64,
    },
    /// The broker no longer accepts work
    #[display("Broker is shutting down")]
    ShuttingDown,
    /// The caller cancelled the request
    #[display("Request was cancelled")]
    Cancelled,
    /// The shutdown drain deadline expired before the request completed
    #[display("Request abandoned at shutdown deadline")]
    ShutdownTimeout,
    /// The resource worker stopped without answering
    #[display("Worker for '{}' stopped", _0)]
    WorkerStopped(String),
}

/// Broker error with source location tracking.
///
/// # Examples
///
/// ```
/// use sluice_error::{BrokerError, BrokerErrorKind};
///
/// let err = BrokerError::new(BrokerErrorKind::UnknownResource("llm".to_string()));
/// assert_eq!(err.kind(), &BrokerErrorKind::UnknownResource("llm".to_string()));
/// assert!(format!("{}", err).contains("Unknown resource"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Broker Error: {} at line {} in {}", kind, line, file)]
pub struct BrokerError {
    kind: BrokerErrorKind,
    line: u32,
    file: &'static str,
}

impl BrokerError {
    /// Create a new BrokerError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: BrokerErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &BrokerErrorKind {
        &self.kind
    }
}
