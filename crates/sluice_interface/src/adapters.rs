//! Adapters exposing capability implementations as resource executors.

use crate::{
    CompletionOptions, Embeddings, LanguageModel, ResourceExecutor, VectorRecord, VectorStore,
    operations,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sluice_error::{ProviderError, ProviderErrorKind, SluiceError, SluiceErrorKind};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Serves [`operations::COMPLETE`] from a [`LanguageModel`].
pub struct LanguageModelExecutor {
    model: Arc<dyn LanguageModel>,
}

impl LanguageModelExecutor {
    /// Wrap a language model.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ResourceExecutor for LanguageModelExecutor {
    #[instrument(skip(self, args))]
    async fn execute(
        &self,
        operation: &str,
        args: &[JsonValue],
    ) -> Result<JsonValue, ProviderError> {
        match operation {
            operations::COMPLETE => {
                let prompt: String = arg(args, 0, "prompt")?;
                let options: CompletionOptions = optional_arg(args, 1, "options")?;
                let text = self
                    .model
                    .complete(&prompt, &options)
                    .await
                    .map_err(into_provider_error)?;
                Ok(JsonValue::String(text))
            }
            other => Err(unsupported(other)),
        }
    }
}

/// Serves [`operations::EMBED`] from an [`Embeddings`] backend.
pub struct EmbeddingsExecutor {
    embeddings: Arc<dyn Embeddings>,
}

impl EmbeddingsExecutor {
    /// Wrap an embeddings backend.
    pub fn new(embeddings: Arc<dyn Embeddings>) -> Self {
        Self { embeddings }
    }
}

#[async_trait]
impl ResourceExecutor for EmbeddingsExecutor {
    #[instrument(skip(self, args))]
    async fn execute(
        &self,
        operation: &str,
        args: &[JsonValue],
    ) -> Result<JsonValue, ProviderError> {
        match operation {
            operations::EMBED => {
                let inputs: Vec<String> = arg(args, 0, "inputs")?;
                let vectors = self
                    .embeddings
                    .embed(&inputs)
                    .await
                    .map_err(into_provider_error)?;
                to_json(&vectors)
            }
            other => Err(unsupported(other)),
        }
    }
}

/// Serves the vector store operations from a [`VectorStore`].
pub struct VectorStoreExecutor {
    store: Arc<dyn VectorStore>,
}

impl VectorStoreExecutor {
    /// Wrap a vector store.
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResourceExecutor for VectorStoreExecutor {
    #[instrument(skip(self, args))]
    async fn execute(
        &self,
        operation: &str,
        args: &[JsonValue],
    ) -> Result<JsonValue, ProviderError> {
        let collection: String = arg(args, 0, "collection")?;
        match operation {
            operations::UPSERT => {
                let records: Vec<VectorRecord> = arg(args, 1, "records")?;
                self.store
                    .upsert(&collection, &records)
                    .await
                    .map_err(into_provider_error)?;
                Ok(JsonValue::Null)
            }
            operations::QUERY => {
                let vector: Vec<f32> = arg(args, 1, "vector")?;
                let top_k: usize = arg(args, 2, "top_k")?;
                let hits = self
                    .store
                    .query(&collection, &vector, top_k)
                    .await
                    .map_err(into_provider_error)?;
                to_json(&hits)
            }
            operations::DELETE => {
                let ids: Vec<String> = arg(args, 1, "ids")?;
                self.store
                    .delete(&collection, &ids)
                    .await
                    .map_err(into_provider_error)?;
                Ok(JsonValue::Null)
            }
            other => Err(unsupported(other)),
        }
    }
}

fn arg<T: DeserializeOwned>(args: &[JsonValue], index: usize, name: &str) -> Result<T, ProviderError> {
    let value = args.get(index).ok_or_else(|| {
        ProviderError::new(ProviderErrorKind::Validation(format!(
            "missing argument {} ({})",
            index, name
        )))
    })?;
    serde_json::from_value(value.clone()).map_err(|e| {
        ProviderError::new(ProviderErrorKind::Validation(format!(
            "argument {} ({}) is malformed: {}",
            index, name, e
        )))
    })
}

fn optional_arg<T: DeserializeOwned + Default>(
    args: &[JsonValue],
    index: usize,
    name: &str,
) -> Result<T, ProviderError> {
    match args.get(index) {
        None | Some(JsonValue::Null) => Ok(T::default()),
        Some(_) => arg(args, index, name),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<JsonValue, ProviderError> {
    serde_json::to_value(value)
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other(format!("encode result: {}", e))))
}

fn unsupported(operation: &str) -> ProviderError {
    debug!(operation, "Unsupported operation");
    ProviderError::new(ProviderErrorKind::Validation(format!(
        "unsupported operation '{}'",
        operation
    )))
}

/// Keep provider failures intact so the broker can classify them; anything
/// else becomes a permanent failure.
fn into_provider_error(err: SluiceError) -> ProviderError {
    match err.kind() {
        SluiceErrorKind::Provider(provider) => provider.clone(),
        SluiceErrorKind::Json(json) => {
            ProviderError::new(ProviderErrorKind::Validation(json.message.clone()))
        }
        _ => ProviderError::new(ProviderErrorKind::Other(err.to_string())),
    }
}
