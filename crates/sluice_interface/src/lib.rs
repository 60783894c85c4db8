//! Trait seams between the broker and the outside world.
//!
//! - [`ResourceExecutor`] is what a resource adapter implements so the broker
//!   can run calls on its behalf.
//! - [`LanguageModel`], [`Embeddings`] and [`VectorStore`] are the typed
//!   capability interfaces callers program against. The broker's queued
//!   wrappers implement them, as do the real adapters.
//! - The `*Executor` adapters turn a capability implementation into a
//!   [`ResourceExecutor`] so it can be registered with the broker.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod adapters;
mod capabilities;
mod executor;
pub mod operations;
mod types;

pub use adapters::{EmbeddingsExecutor, LanguageModelExecutor, VectorStoreExecutor};
pub use capabilities::{Embeddings, LanguageModel, VectorStore};
pub use executor::{FnExecutor, ResourceExecutor, executor_fn};
pub use types::{CompletionOptions, ScoredRecord, VectorRecord};
