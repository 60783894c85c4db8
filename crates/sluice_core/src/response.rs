//! Results delivered to callers.

use serde_json::Value as JsonValue;
use sluice_error::ProviderError;

/// Outcome of a request, delivered exactly once.
///
/// Provider failures arrive here only after retries are exhausted or the
/// failure was classified as permanent.
///
/// # Examples
///
/// ```
/// use sluice_core::ResourceResponse;
/// use serde_json::json;
///
/// let response = ResourceResponse::success(json!("done"), 0);
/// assert!(response.success);
/// assert_eq!(response.into_result().unwrap(), json!("done"));
/// ```
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    /// Whether the executor eventually succeeded.
    pub success: bool,
    /// Executor output on success.
    pub data: Option<JsonValue>,
    /// Final provider failure otherwise.
    pub error: Option<ProviderError>,
    /// Zero-based attempt that produced this response.
    pub attempt: u32,
}

impl ResourceResponse {
    /// Successful response.
    pub fn success(data: JsonValue, attempt: u32) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            attempt,
        }
    }

    /// Failed response.
    pub fn failure(error: ProviderError, attempt: u32) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            attempt,
        }
    }

    /// Unwrap into the executor's value or its final error.
    pub fn into_result(self) -> Result<JsonValue, ProviderError> {
        match (self.success, self.data, self.error) {
            (true, data, _) => Ok(data.unwrap_or(JsonValue::Null)),
            (false, _, Some(error)) => Err(error),
            (false, _, None) => Err(ProviderError::new(
                sluice_error::ProviderErrorKind::Other("failed without an error".to_string()),
            )),
        }
    }
}
