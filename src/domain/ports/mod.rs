//! Capability ports.
//!
//! The engine talks to embedding services and vector databases only through
//! these traits, so tests substitute deterministic doubles and production
//! wires in HTTP or SQLite adapters without touching the orchestration code.

pub mod embedding;
pub mod splitter;
pub mod vector_store;

pub use embedding::EmbeddingProvider;
pub use splitter::{Splitter, SplitterOptions};
pub use vector_store::{DocumentFilter, QueryMode, QueryRequest, VectorStore};
