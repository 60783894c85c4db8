//! The executor seam the broker drives.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sluice_error::ProviderError;
use std::future::Future;
use std::sync::Arc;

/// Runs operations against one external resource.
///
/// Implementations report provider failures (HTTP status, network errors,
/// timeouts) as [`ProviderError`] so the broker can classify them for retry.
/// Executors are invoked on a spawned task; a panic is caught and reported to
/// the caller as a permanent failure.
#[async_trait]
pub trait ResourceExecutor: Send + Sync {
    /// Execute `operation` with positional JSON arguments.
    async fn execute(&self, operation: &str, args: &[JsonValue])
    -> Result<JsonValue, ProviderError>;
}

/// Closure-backed executor.
///
/// # Examples
///
/// ```rust,ignore
/// use serde_json::{json, Value};
/// use sluice_interface::executor_fn;
///
/// let echo = executor_fn(|operation, args| async move {
///     Ok::<Value, ProviderError>(json!({ "op": operation, "argc": args.len() }))
/// });
/// let out = echo.execute("ping", &[json!(1)]).await?;
/// assert_eq!(out["op"], "ping");
/// ```
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ResourceExecutor for FnExecutor<F>
where
    F: Fn(String, Vec<JsonValue>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JsonValue, ProviderError>> + Send,
{
    async fn execute(
        &self,
        operation: &str,
        args: &[JsonValue],
    ) -> Result<JsonValue, ProviderError> {
        (self.f)(operation.to_string(), args.to_vec()).await
    }
}

/// Box a closure as a shareable executor.
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn ResourceExecutor>
where
    F: Fn(String, Vec<JsonValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JsonValue, ProviderError>> + Send + 'static,
{
    Arc::new(FnExecutor::new(f))
}
