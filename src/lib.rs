//! Hybrid semantic + lexical code search engine.
//!
//! The crate ingests a directory tree of source code, splits each file into
//! semantically meaningful chunks, embeds every chunk through a pluggable
//! [`EmbeddingProvider`](domain::ports::EmbeddingProvider), and stores dense
//! vectors together with a BM25 keyword index in a local
//! [`VectorStore`](domain::ports::VectorStore). Queries fuse dense and sparse
//! candidate lists with Reciprocal Rank Fusion.
//!
//! Indexing is incremental: a content-hash synchronizer detects added,
//! modified, and removed files, and a persistent snapshot tracks per-codebase
//! status (`indexing`, `indexed`, `indexfailed`) across process restarts.
//!
//! The main entry point is [`application::Context`].

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod providers;

// Re-export core types for public API
pub use application::{Context, IndexOptions, SearchOptions};
pub use domain::error::{Error, Result};
pub use domain::types::*;
