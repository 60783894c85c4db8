//! Value types exchanged with capability implementations.

use serde::{Deserialize, Serialize};

/// Generation parameters for a completion call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Maximum number of tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0 to 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Model identifier to use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A vector stored under an id, with free-form metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Record identifier, unique within a collection
    pub id: String,
    /// Embedding values
    pub vector: Vec<f32>,
    /// Arbitrary metadata returned with query hits
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A similarity query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// Record identifier
    pub id: String,
    /// Similarity score, higher is closer
    pub score: f32,
    /// Metadata stored with the record
    #[serde(default)]
    pub metadata: serde_json::Value,
}
