//! Units of work submitted to the broker.

use crate::Priority;
use serde_json::Value as JsonValue;
use sluice_error::{BuilderError, BuilderErrorKind};
use tokio_util::sync::CancellationToken;

/// One call against a named resource.
///
/// Requests are immutable once submitted. `estimated_cost` is charged against
/// the resource's per-window cost budget (for example estimated tokens) and
/// defaults to one unit.
///
/// # Examples
///
/// ```
/// use sluice_core::{Priority, ResourceRequest};
/// use serde_json::json;
///
/// let request = ResourceRequest::builder()
///     .resource("embeddings")
///     .operation("embed")
///     .args(vec![json!(["hello", "world"])])
///     .priority(Priority::High)
///     .estimated_cost(3u64)
///     .build()
///     .unwrap();
///
/// assert_eq!(request.resource(), "embeddings");
/// assert_eq!(*request.estimated_cost(), 3);
/// assert!(request.cancel_token().is_none());
/// ```
#[derive(Debug, Clone, derive_builder::Builder, derive_getters::Getters)]
#[builder(setter(into), build_fn(private, name = "build_internal"))]
pub struct ResourceRequest {
    /// Registered resource name (e.g. "llm").
    resource: String,
    /// Operation understood by the resource executor (e.g. "complete").
    operation: String,
    /// Positional JSON arguments handed to the executor.
    #[builder(default)]
    args: Vec<JsonValue>,
    /// Scheduling lane.
    #[builder(default)]
    priority: Priority,
    /// Cost units charged at admission.
    #[builder(default = "1")]
    estimated_cost: u64,
    /// Caller-held token; cancelling it withdraws the request.
    #[builder(default, setter(into, strip_option))]
    cancel_token: Option<CancellationToken>,
}

impl ResourceRequest {
    /// Creates a new request builder.
    pub fn builder() -> ResourceRequestBuilder {
        ResourceRequestBuilder::default()
    }

    /// Normal priority, unit cost request.
    pub fn new(
        resource: impl Into<String>,
        operation: impl Into<String>,
        args: Vec<JsonValue>,
    ) -> Self {
        Self {
            resource: resource.into(),
            operation: operation.into(),
            args,
            priority: Priority::default(),
            estimated_cost: 1,
            cancel_token: None,
        }
    }

    /// True once the caller has cancelled this request.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl ResourceRequestBuilder {
    /// Build the ResourceRequest.
    ///
    /// # Errors
    ///
    /// Returns error if `resource` or `operation` is missing or empty.
    pub fn build(&self) -> Result<ResourceRequest, BuilderError> {
        let request = self.build_internal().map_err(|e| match e {
            ResourceRequestBuilderError::UninitializedField(field) => {
                BuilderError::new(BuilderErrorKind::MissingField(field.to_string()))
            }
            ResourceRequestBuilderError::ValidationError(msg) => {
                BuilderError::new(BuilderErrorKind::ValidationFailed(msg))
            }
        })?;

        if request.resource.is_empty() {
            return Err(BuilderError::new(BuilderErrorKind::ValidationFailed(
                "resource must not be empty".to_string(),
            )));
        }
        if request.operation.is_empty() {
            return Err(BuilderError::new(BuilderErrorKind::ValidationFailed(
                "operation must not be empty".to_string(),
            )));
        }

        Ok(request)
    }
}
