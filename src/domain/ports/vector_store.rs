//! Vector store capability.

use crate::domain::error::Result;
use crate::domain::types::{HybridDocument, ScoredDocument};
use async_trait::async_trait;

/// Metadata predicate applied to queries and deletes.
///
/// All set fields must match. Equality is supported on `relativePath`; the
/// extension filter matches when `fileExtension` is any of the listed values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    /// Exact match on the document's relative path
    pub relative_path: Option<String>,
    /// Membership match on the document's file extension (with leading dot)
    pub file_extensions: Option<Vec<String>>,
}

impl DocumentFilter {
    /// Filter selecting every document of one file.
    pub fn for_path(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: Some(relative_path.into()),
            file_extensions: None,
        }
    }

    /// Whether a document passes the filter.
    pub fn matches(&self, doc: &HybridDocument) -> bool {
        if let Some(ref path) = self.relative_path {
            if doc.metadata.relative_path != *path {
                return false;
            }
        }
        if let Some(ref exts) = self.file_extensions {
            if !exts.iter().any(|e| *e == doc.metadata.file_extension) {
                return false;
            }
        }
        true
    }

    /// Whether the filter constrains anything.
    pub fn is_empty(&self) -> bool {
        self.relative_path.is_none() && self.file_extensions.is_none()
    }
}

/// Which retrieval leg a query exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Cosine similarity over `dense_vector`
    Dense,
    /// BM25 over `keywords`
    Sparse,
}

/// A single-leg retrieval request.
///
/// The hybrid planner issues one dense and one sparse request and fuses the
/// two ranked lists itself; the store only ever executes one leg at a time.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Which leg to execute
    pub mode: QueryMode,
    /// Query embedding; required for [`QueryMode::Dense`]
    pub dense_vector: Option<Vec<f32>>,
    /// Query terms; required for [`QueryMode::Sparse`]
    pub keywords: Option<Vec<String>>,
    /// Maximum candidates to return
    pub limit: usize,
    /// Optional metadata predicate
    pub filter: Option<DocumentFilter>,
}

impl QueryRequest {
    /// Dense-leg request.
    pub fn dense(vector: Vec<f32>, limit: usize, filter: Option<DocumentFilter>) -> Self {
        Self {
            mode: QueryMode::Dense,
            dense_vector: Some(vector),
            keywords: None,
            limit,
            filter,
        }
    }

    /// Sparse-leg request.
    pub fn sparse(keywords: Vec<String>, limit: usize, filter: Option<DocumentFilter>) -> Self {
        Self {
            mode: QueryMode::Sparse,
            dense_vector: None,
            keywords: Some(keywords),
            limit,
            filter,
        }
    }
}

/// Contract for hybrid document storage backends.
///
/// Collections pin a vector dimension at creation; upserting a wrong-length
/// vector fails the whole batch with `DimensionMismatch` and writes nothing.
/// Querying a missing collection is an error, never an implicit create.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent; idempotent for a matching dimension.
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Whether the collection exists.
    async fn has_collection(&self, name: &str) -> Result<bool>;

    /// Dimension pinned in the collection schema, `None` when absent.
    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>>;

    /// Drop the collection and all its documents. Idempotent.
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Insert or overwrite documents; transactional per batch.
    async fn upsert(&self, name: &str, documents: Vec<HybridDocument>) -> Result<()>;

    /// Delete documents matching the filter; returns the count removed.
    async fn delete_by_predicate(&self, name: &str, filter: &DocumentFilter) -> Result<usize>;

    /// Execute one retrieval leg, best score first.
    async fn query(&self, name: &str, request: QueryRequest) -> Result<Vec<ScoredDocument>>;

    /// Names of all existing collections.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Backend-advertised cap on collection count, if any.
    fn collection_limit(&self) -> Option<usize> {
        None
    }
}
