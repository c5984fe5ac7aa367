//! In-memory vector store.
//!
//! Reference implementation of the [`VectorStore`] contract: tests run
//! against it, and the SQLite backend must match its observable behavior.

use super::{bm25_scores, cosine_similarity, top_k};
use crate::domain::error::{Error, Result};
use crate::domain::ports::vector_store::{DocumentFilter, QueryMode, QueryRequest};
use crate::domain::ports::VectorStore;
use crate::domain::types::{HybridDocument, ScoredDocument};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Collection {
    dimension: usize,
    documents: HashMap<String, HybridDocument>,
}

/// Ephemeral store backed by a `RwLock`ed map.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<BTreeMap<String, Collection>>,
    collection_limit: Option<usize>,
}

impl InMemoryVectorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store advertising a collection cap (tests).
    pub fn with_collection_limit(limit: usize) -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            collection_limit: Some(limit),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().expect("store lock poisoned");
        match collections.get(name) {
            Some(existing) if existing.dimension != dimension => Err(Error::DimensionMismatch {
                expected: existing.dimension,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    name.to_string(),
                    Collection {
                        dimension,
                        documents: HashMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self
            .collections
            .read()
            .expect("store lock poisoned")
            .contains_key(name))
    }

    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        Ok(self
            .collections
            .read()
            .expect("store lock poisoned")
            .get(name)
            .map(|c| c.dimension))
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .expect("store lock poisoned")
            .remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, documents: Vec<HybridDocument>) -> Result<()> {
        let mut collections = self.collections.write().expect("store lock poisoned");
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| Error::vector_store(format!("collection {name} does not exist")))?;

        // Validate the whole batch before the first write: a dimension
        // mismatch must not leave a partial batch behind.
        for doc in &documents {
            if doc.dense_vector.len() != collection.dimension {
                return Err(Error::DimensionMismatch {
                    expected: collection.dimension,
                    actual: doc.dense_vector.len(),
                });
            }
        }
        for doc in documents {
            collection.documents.insert(doc.id.clone(), doc);
        }
        Ok(())
    }

    async fn delete_by_predicate(&self, name: &str, filter: &DocumentFilter) -> Result<usize> {
        let mut collections = self.collections.write().expect("store lock poisoned");
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| Error::vector_store(format!("collection {name} does not exist")))?;
        let before = collection.documents.len();
        collection.documents.retain(|_, doc| !filter.matches(doc));
        Ok(before - collection.documents.len())
    }

    async fn query(&self, name: &str, request: QueryRequest) -> Result<Vec<ScoredDocument>> {
        let collections = self.collections.read().expect("store lock poisoned");
        let collection = collections
            .get(name)
            .ok_or_else(|| Error::vector_store(format!("collection {name} does not exist")))?;

        let candidates: Vec<&HybridDocument> = collection
            .documents
            .values()
            .filter(|doc| request.filter.as_ref().map(|f| f.matches(doc)).unwrap_or(true))
            .collect();

        let scored = match request.mode {
            QueryMode::Dense => {
                let query = request.dense_vector.as_deref().ok_or_else(|| {
                    Error::vector_store("dense query without a query vector")
                })?;
                candidates
                    .into_iter()
                    .map(|doc| ScoredDocument {
                        document: doc.clone(),
                        score: cosine_similarity(query, &doc.dense_vector),
                    })
                    .collect()
            }
            QueryMode::Sparse => {
                let terms = request.keywords.as_deref().ok_or_else(|| {
                    Error::vector_store("sparse query without query terms")
                })?;
                let keyword_lists: Vec<&[String]> =
                    candidates.iter().map(|doc| doc.keywords.as_slice()).collect();
                let scores = bm25_scores(&keyword_lists, terms);
                candidates
                    .into_iter()
                    .zip(scores)
                    .filter(|(_, score)| *score > 0.0)
                    .map(|(doc, score)| ScoredDocument {
                        document: doc.clone(),
                        score,
                    })
                    .collect()
            }
        };

        Ok(top_k(scored, request.limit))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self
            .collections
            .read()
            .expect("store lock poisoned")
            .keys()
            .cloned()
            .collect())
    }

    fn collection_limit(&self) -> Option<usize> {
        self.collection_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ChunkMetadata;

    fn doc(id: &str, vector: Vec<f32>, keywords: &[&str], path: &str) -> HybridDocument {
        HybridDocument {
            id: id.to_string(),
            dense_vector: vector,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            content: format!("content of {id}"),
            metadata: ChunkMetadata {
                relative_path: path.to_string(),
                start_line: 1,
                end_line: 2,
                language: "rust".to_string(),
                file_extension: ".rs".to_string(),
                node_kind: None,
            },
        }
    }

    #[tokio::test]
    async fn upsert_and_dense_query_round_trip() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    doc("a", vec![1.0, 0.0], &["alpha"], "a.rs"),
                    doc("b", vec![0.0, 1.0], &["beta"], "b.rs"),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .query("c", QueryRequest::dense(vec![1.0, 0.0], 10, None))
            .await
            .unwrap();
        assert_eq!(hits[0].document.id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn dimension_mismatch_rejects_the_whole_batch() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        let err = store
            .upsert(
                "c",
                vec![
                    doc("ok", vec![1.0, 0.0], &[], "a.rs"),
                    doc("bad", vec![1.0, 0.0, 0.0], &[], "b.rs"),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));

        // Nothing was written, not even the valid document.
        let hits = store
            .query("c", QueryRequest::dense(vec![1.0, 0.0], 10, None))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent_but_pins_dimension() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 4).await.unwrap();
        store.ensure_collection("c", 4).await.unwrap();
        let err = store.ensure_collection("c", 8).await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 8 }));
    }

    #[tokio::test]
    async fn delete_by_predicate_removes_one_files_documents() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 1).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    doc("a1", vec![1.0], &[], "a.rs"),
                    doc("a2", vec![1.0], &[], "a.rs"),
                    doc("b1", vec![1.0], &[], "b.rs"),
                ],
            )
            .await
            .unwrap();

        let removed = store
            .delete_by_predicate("c", &DocumentFilter::for_path("a.rs"))
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let hits = store
            .query("c", QueryRequest::dense(vec![1.0], 10, None))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "b1");
    }

    #[tokio::test]
    async fn sparse_query_scores_by_bm25_and_drops_non_matches() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 1).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    doc("a", vec![1.0], &["add", "numbers"], "a.rs"),
                    doc("b", vec![1.0], &["remove", "numbers"], "b.rs"),
                    doc("x", vec![1.0], &["unrelated"], "x.rs"),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .query(
                "c",
                QueryRequest::sparse(vec!["add".to_string(), "numbers".to_string()], 10, None),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.id, "a");
    }

    #[tokio::test]
    async fn extension_filter_constrains_queries() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 1).await.unwrap();
        let mut ts = doc("t", vec![1.0], &["x"], "t.ts");
        ts.metadata.file_extension = ".ts".to_string();
        store
            .upsert("c", vec![ts, doc("r", vec![1.0], &["x"], "r.rs")])
            .await
            .unwrap();

        let filter = DocumentFilter {
            relative_path: None,
            file_extensions: Some(vec![".ts".to_string()]),
        };
        let hits = store
            .query("c", QueryRequest::dense(vec![1.0], 10, Some(filter)))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "t");
    }

    #[tokio::test]
    async fn missing_collection_is_an_error_not_a_create() {
        let store = InMemoryVectorStore::new();
        let err = store
            .query("nope", QueryRequest::dense(vec![1.0], 10, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VectorStore { .. }));
        assert!(!store.has_collection("nope").await.unwrap());
    }
}
