//! Capability implementations that route every call through the broker.
//!
//! Wrap a shared [`ResourceBroker`] to get a [`LanguageModel`],
//! [`Embeddings`] or [`VectorStore`] whose calls are queued, rate limited and
//! retried. The resource must be registered with an executor that understands
//! the operations in [`sluice_interface::operations`], such as
//! [`LanguageModelExecutor`](sluice_interface::LanguageModelExecutor).

use crate::ResourceBroker;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sluice_core::{Priority, ResourceRequest};
use sluice_error::{JsonError, SluiceResult};
use sluice_interface::{
    CompletionOptions, Embeddings, LanguageModel, ScoredRecord, VectorRecord, VectorStore,
    operations,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Rough token count: four characters per token, rounded up.
fn approx_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

fn to_arg<T: Serialize + ?Sized>(value: &T) -> SluiceResult<JsonValue> {
    serde_json::to_value(value)
        .map_err(|e| JsonError::new(format!("Failed to encode argument: {}", e)).into())
}

#[derive(Debug, Clone)]
struct Route {
    broker: Arc<ResourceBroker>,
    resource: String,
    priority: Priority,
}

impl Route {
    fn new(broker: Arc<ResourceBroker>, resource: String) -> Self {
        Self {
            broker,
            resource,
            priority: Priority::default(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: Vec<JsonValue>,
        estimated_cost: u64,
    ) -> SluiceResult<T> {
        let request = ResourceRequest::builder()
            .resource(self.resource.as_str())
            .operation(operation)
            .args(args)
            .priority(self.priority)
            .estimated_cost(estimated_cost)
            .build()?;

        let response = self.broker.submit(request).await?;
        debug!(attempt = response.attempt, success = response.success, "Queued call finished");
        let data = response.into_result()?;

        serde_json::from_value(data)
            .map_err(|e| JsonError::new(format!("Failed to decode {} result: {}", operation, e)).into())
    }
}

/// [`LanguageModel`] backed by a broker resource.
///
/// Cost per call is the prompt's approximate token count plus `max_tokens`,
/// and at least one.
#[derive(Debug, Clone)]
pub struct QueuedLlm {
    route: Route,
}

impl QueuedLlm {
    /// Routes completions to `resource` at normal priority.
    pub fn new(broker: Arc<ResourceBroker>, resource: impl Into<String>) -> Self {
        Self {
            route: Route::new(broker, resource.into()),
        }
    }

    /// Sets the priority of every call.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.route.priority = priority;
        self
    }

    /// Cost units charged for one completion.
    pub fn estimate_cost(prompt: &str, options: &CompletionOptions) -> u64 {
        (approx_tokens(prompt) + u64::from(options.max_tokens.unwrap_or(0))).max(1)
    }
}

#[async_trait]
impl LanguageModel for QueuedLlm {
    #[instrument(skip(self, prompt, options), fields(resource = %self.route.resource))]
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> SluiceResult<String> {
        let cost = Self::estimate_cost(prompt, options);
        self.route
            .call(
                operations::COMPLETE,
                vec![JsonValue::String(prompt.to_string()), to_arg(options)?],
                cost,
            )
            .await
    }
}

/// [`Embeddings`] backed by a broker resource.
///
/// Cost per call is the approximate token count of all inputs, and at least one.
#[derive(Debug, Clone)]
pub struct QueuedEmbeddings {
    route: Route,
}

impl QueuedEmbeddings {
    /// Routes embedding calls to `resource` at normal priority.
    pub fn new(broker: Arc<ResourceBroker>, resource: impl Into<String>) -> Self {
        Self {
            route: Route::new(broker, resource.into()),
        }
    }

    /// Sets the priority of every call.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.route.priority = priority;
        self
    }

    /// Cost units charged for embedding `inputs`.
    pub fn estimate_cost(inputs: &[String]) -> u64 {
        let chars: u64 = inputs.iter().map(|s| s.chars().count() as u64).sum();
        chars.div_ceil(4).max(1)
    }
}

#[async_trait]
impl Embeddings for QueuedEmbeddings {
    #[instrument(skip(self, inputs), fields(resource = %self.route.resource, count = inputs.len()))]
    async fn embed(&self, inputs: &[String]) -> SluiceResult<Vec<Vec<f32>>> {
        let cost = Self::estimate_cost(inputs);
        self.route
            .call(operations::EMBED, vec![to_arg(inputs)?], cost)
            .await
    }
}

/// [`VectorStore`] backed by a broker resource.
///
/// Each call costs one unit per record or id touched, and at least one.
#[derive(Debug, Clone)]
pub struct QueuedVectorStore {
    route: Route,
}

impl QueuedVectorStore {
    /// Routes vector store calls to `resource` at normal priority.
    pub fn new(broker: Arc<ResourceBroker>, resource: impl Into<String>) -> Self {
        Self {
            route: Route::new(broker, resource.into()),
        }
    }

    /// Sets the priority of every call.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.route.priority = priority;
        self
    }
}

#[async_trait]
impl VectorStore for QueuedVectorStore {
    #[instrument(skip(self, records), fields(resource = %self.route.resource, count = records.len()))]
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> SluiceResult<()> {
        let cost = (records.len() as u64).max(1);
        let _: JsonValue = self
            .route
            .call(
                operations::UPSERT,
                vec![to_arg(collection)?, to_arg(records)?],
                cost,
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, vector), fields(resource = %self.route.resource))]
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> SluiceResult<Vec<ScoredRecord>> {
        self.route
            .call(
                operations::QUERY,
                vec![to_arg(collection)?, to_arg(vector)?, to_arg(&top_k)?],
                1,
            )
            .await
    }

    #[instrument(skip(self, ids), fields(resource = %self.route.resource, count = ids.len()))]
    async fn delete(&self, collection: &str, ids: &[String]) -> SluiceResult<()> {
        let cost = (ids.len() as u64).max(1);
        let _: JsonValue = self
            .route
            .call(
                operations::DELETE,
                vec![to_arg(collection)?, to_arg(ids)?],
                cost,
            )
            .await?;
        Ok(())
    }
}
