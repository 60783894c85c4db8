//! Top-level error wrapper types.

use crate::{BrokerError, BuilderError, ConfigError, JsonError, ProviderError, RateLimitError};

/// Every failure domain in the workspace, collected for `?` propagation.
///
/// # Examples
///
/// ```
/// use sluice_error::{SluiceError, ConfigError};
///
/// let err: SluiceError = ConfigError::new("missing window").into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum SluiceErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// JSON serialization/deserialization error
    #[from(JsonError)]
    Json(JsonError),
    /// Builder error
    #[from(BuilderError)]
    Builder(BuilderError),
    /// Broker admission or delivery error
    #[from(BrokerError)]
    Broker(BrokerError),
    /// Provider failure surfaced after retries
    #[from(ProviderError)]
    Provider(ProviderError),
    /// Rate limiting backend error
    #[from(RateLimitError)]
    RateLimit(RateLimitError),
}

/// Sluice error with kind discrimination.
///
/// # Examples
///
/// ```
/// use sluice_error::{SluiceErrorKind, SluiceResult, BrokerError, BrokerErrorKind};
///
/// fn might_fail() -> SluiceResult<()> {
///     Err(BrokerError::new(BrokerErrorKind::ShuttingDown))?
/// }
///
/// let err = might_fail().unwrap_err();
/// assert!(matches!(err.kind(), SluiceErrorKind::Broker(_)));
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Sluice Error: {}", _0)]
pub struct SluiceError(Box<SluiceErrorKind>);

impl SluiceError {
    /// Create a new error from a kind.
    pub fn new(kind: SluiceErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &SluiceErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to SluiceErrorKind
impl<T> From<T> for SluiceError
where
    T: Into<SluiceErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Sluice operations.
pub type SluiceResult<T> = std::result::Result<T, SluiceError>;
