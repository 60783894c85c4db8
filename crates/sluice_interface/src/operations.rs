//! Operation names shared by the queued wrappers and the executor adapters.

/// Text completion: `[prompt, options]` -> `string`.
pub const COMPLETE: &str = "complete";

/// Embedding: `[texts]` -> `[[f32]]`.
pub const EMBED: &str = "embed";

/// Vector upsert: `[collection, records]` -> `null`.
pub const UPSERT: &str = "upsert";

/// Vector similarity query: `[collection, vector, top_k]` -> `[ScoredRecord]`.
pub const QUERY: &str = "query";

/// Vector delete: `[collection, ids]` -> `null`.
pub const DELETE: &str = "delete";
