//! Typed capability interfaces.

use crate::{CompletionOptions, ScoredRecord, VectorRecord};
use async_trait::async_trait;
use sluice_error::SluiceResult;

/// Text completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a prompt.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> SluiceResult<String>;
}

/// Embedding backend.
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Generate embeddings for one or more text inputs.
    ///
    /// Returns a vector of embedding vectors, one per input.
    async fn embed(&self, inputs: &[String]) -> SluiceResult<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> SluiceResult<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        Ok(vectors.pop().unwrap_or_default())
    }
}

/// Vector store backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records in a collection.
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> SluiceResult<()>;

    /// Return the `top_k` records closest to `vector`.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> SluiceResult<Vec<ScoredRecord>>;

    /// Remove records by id.
    async fn delete(&self, collection: &str, ids: &[String]) -> SluiceResult<()>;
}
