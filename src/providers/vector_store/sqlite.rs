//! SQLite-backed vector store.
//!
//! Vectors are stored as little-endian f32 BLOBs and keyword lists as JSON;
//! similarity and BM25 run in Rust over the (filtered) collection, exactly
//! like the in-memory reference store. One writer connection per store
//! instance, serialized behind an async mutex.

use super::{bm25_scores, cosine_similarity, top_k};
use crate::domain::error::{Error, Result};
use crate::domain::ports::vector_store::{DocumentFilter, QueryMode, QueryRequest};
use crate::domain::ports::VectorStore;
use crate::domain::types::{ChunkMetadata, HybridDocument, ScoredDocument};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name      TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS documents (
    collection     TEXT NOT NULL,
    id             TEXT NOT NULL,
    vector         BLOB NOT NULL,
    keywords       TEXT NOT NULL,
    content        TEXT NOT NULL,
    relative_path  TEXT NOT NULL,
    start_line     INTEGER NOT NULL,
    end_line       INTEGER NOT NULL,
    language       TEXT NOT NULL,
    file_extension TEXT NOT NULL,
    node_kind      TEXT,
    PRIMARY KEY (collection, id)
);
CREATE INDEX IF NOT EXISTS idx_documents_path
    ON documents (collection, relative_path);
";

/// Persistent local store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteVectorStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "sqlite vector store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
        let mut blob = Vec::with_capacity(vector.len() * 4);
        for value in vector {
            blob.extend_from_slice(&value.to_le_bytes());
        }
        blob
    }

    fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    fn load_candidates(
        conn: &Connection,
        name: &str,
        filter: Option<&DocumentFilter>,
    ) -> Result<Vec<HybridDocument>> {
        let mut sql = String::from(
            "SELECT id, vector, keywords, content, relative_path, start_line, end_line, \
             language, file_extension, node_kind FROM documents WHERE collection = ?1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(name.to_string())];

        if let Some(filter) = filter {
            if let Some(ref path) = filter.relative_path {
                params.push(Box::new(path.clone()));
                sql.push_str(&format!(" AND relative_path = ?{}", params.len()));
            }
            if let Some(ref exts) = filter.file_extensions {
                let placeholders: Vec<String> = exts
                    .iter()
                    .map(|ext| {
                        params.push(Box::new(ext.clone()));
                        format!("?{}", params.len())
                    })
                    .collect();
                sql.push_str(&format!(
                    " AND file_extension IN ({})",
                    placeholders.join(", ")
                ));
            }
        }

        let mut statement = conn.prepare(&sql)?;
        let rows = statement.query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            |row| {
                let vector_blob: Vec<u8> = row.get(1)?;
                let keywords_json: String = row.get(2)?;
                Ok(HybridDocument {
                    id: row.get(0)?,
                    dense_vector: Self::blob_to_vector(&vector_blob),
                    keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
                    content: row.get(3)?,
                    metadata: ChunkMetadata {
                        relative_path: row.get(4)?,
                        start_line: row.get(5)?,
                        end_line: row.get(6)?,
                        language: row.get(7)?,
                        file_extension: row.get(8)?,
                        node_kind: row.get(9)?,
                    },
                })
            },
        )?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }
        Ok(documents)
    }

    fn dimension_of(conn: &Connection, name: &str) -> Result<Option<usize>> {
        let dimension: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(dimension.map(|d| d as usize))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let conn = self.conn.lock().await;
        match Self::dimension_of(&conn, name)? {
            Some(existing) if existing != dimension => Err(Error::DimensionMismatch {
                expected: existing,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                conn.execute(
                    "INSERT INTO collections (name, dimension) VALUES (?1, ?2)",
                    params![name, dimension as i64],
                )?;
                Ok(())
            }
        }
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        Ok(Self::dimension_of(&conn, name)?.is_some())
    }

    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        let conn = self.conn.lock().await;
        Self::dimension_of(&conn, name)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM documents WHERE collection = ?1", params![name])?;
        tx.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        tx.commit()?;
        Ok(())
    }

    async fn upsert(&self, name: &str, documents: Vec<HybridDocument>) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let dimension = Self::dimension_of(&conn, name)?
            .ok_or_else(|| Error::vector_store(format!("collection {name} does not exist")))?;

        // Validate before opening the transaction so a bad batch writes
        // nothing at all.
        for doc in &documents {
            if doc.dense_vector.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    actual: doc.dense_vector.len(),
                });
            }
        }

        let tx = conn.transaction()?;
        {
            let mut statement = tx.prepare(
                "INSERT OR REPLACE INTO documents \
                 (collection, id, vector, keywords, content, relative_path, start_line, \
                  end_line, language, file_extension, node_kind) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for doc in &documents {
                statement.execute(params![
                    name,
                    doc.id,
                    Self::vector_to_blob(&doc.dense_vector),
                    serde_json::to_string(&doc.keywords)?,
                    doc.content,
                    doc.metadata.relative_path,
                    doc.metadata.start_line,
                    doc.metadata.end_line,
                    doc.metadata.language,
                    doc.metadata.file_extension,
                    doc.metadata.node_kind,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete_by_predicate(&self, name: &str, filter: &DocumentFilter) -> Result<usize> {
        let conn = self.conn.lock().await;
        if Self::dimension_of(&conn, name)?.is_none() {
            return Err(Error::vector_store(format!(
                "collection {name} does not exist"
            )));
        }

        let mut sql = String::from("DELETE FROM documents WHERE collection = ?1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(name.to_string())];
        if let Some(ref path) = filter.relative_path {
            params.push(Box::new(path.clone()));
            sql.push_str(&format!(" AND relative_path = ?{}", params.len()));
        }
        if let Some(ref exts) = filter.file_extensions {
            let placeholders: Vec<String> = exts
                .iter()
                .map(|ext| {
                    params.push(Box::new(ext.clone()));
                    format!("?{}", params.len())
                })
                .collect();
            sql.push_str(&format!(
                " AND file_extension IN ({})",
                placeholders.join(", ")
            ));
        }

        let removed = conn.execute(
            &sql,
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
        )?;
        Ok(removed)
    }

    async fn query(&self, name: &str, request: QueryRequest) -> Result<Vec<ScoredDocument>> {
        let conn = self.conn.lock().await;
        if Self::dimension_of(&conn, name)?.is_none() {
            return Err(Error::vector_store(format!(
                "collection {name} does not exist"
            )));
        }
        let candidates = Self::load_candidates(&conn, name, request.filter.as_ref())?;

        let scored: Vec<ScoredDocument> = match request.mode {
            QueryMode::Dense => {
                let query = request
                    .dense_vector
                    .as_deref()
                    .ok_or_else(|| Error::vector_store("dense query without a query vector"))?;
                candidates
                    .into_iter()
                    .map(|document| {
                        let score = cosine_similarity(query, &document.dense_vector);
                        ScoredDocument { document, score }
                    })
                    .collect()
            }
            QueryMode::Sparse => {
                let terms = request
                    .keywords
                    .as_deref()
                    .ok_or_else(|| Error::vector_store("sparse query without query terms"))?;
                let keyword_lists: Vec<&[String]> =
                    candidates.iter().map(|doc| doc.keywords.as_slice()).collect();
                let scores = bm25_scores(&keyword_lists, terms);
                candidates
                    .into_iter()
                    .zip(scores)
                    .filter(|(_, score)| *score > 0.0)
                    .map(|(document, score)| ScoredDocument { document, score })
                    .collect()
            }
        };

        Ok(top_k(scored, request.limit))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare("SELECT name FROM collections ORDER BY name")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(id: &str, vector: Vec<f32>, keywords: &[&str], path: &str) -> HybridDocument {
        HybridDocument {
            id: id.to_string(),
            dense_vector: vector,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            content: format!("content of {id}"),
            metadata: ChunkMetadata {
                relative_path: path.to_string(),
                start_line: 1,
                end_line: 3,
                language: "rust".to_string(),
                file_extension: ".rs".to_string(),
                node_kind: Some("function".to_string()),
            },
        }
    }

    fn store() -> (SqliteVectorStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("store.db")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn documents_survive_a_round_trip() {
        let (store, _dir) = store();
        store.ensure_collection("c", 2).await.unwrap();
        let original = doc("a", vec![0.6, 0.8], &["alpha", "beta"], "src/a.rs");
        store.upsert("c", vec![original.clone()]).await.unwrap();

        let hits = store
            .query("c", QueryRequest::dense(vec![0.6, 0.8], 10, None))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document, original);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn duplicate_ids_overwrite() {
        let (store, _dir) = store();
        store.ensure_collection("c", 1).await.unwrap();
        store.upsert("c", vec![doc("a", vec![1.0], &[], "a.rs")]).await.unwrap();
        let mut updated = doc("a", vec![1.0], &[], "a.rs");
        updated.content = "rewritten".to_string();
        store.upsert("c", vec![updated]).await.unwrap();

        let hits = store
            .query("c", QueryRequest::dense(vec![1.0], 10, None))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.content, "rewritten");
    }

    #[tokio::test]
    async fn dimension_mismatch_writes_nothing() {
        let (store, _dir) = store();
        store.ensure_collection("c", 2).await.unwrap();
        let err = store
            .upsert(
                "c",
                vec![
                    doc("ok", vec![1.0, 0.0], &[], "a.rs"),
                    doc("bad", vec![1.0], &[], "b.rs"),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));

        let hits = store
            .query("c", QueryRequest::dense(vec![1.0, 0.0], 10, None))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_by_path_then_extension() {
        let (store, _dir) = store();
        store.ensure_collection("c", 1).await.unwrap();
        let mut ts = doc("t", vec![1.0], &[], "t.ts");
        ts.metadata.file_extension = ".ts".to_string();
        store
            .upsert(
                "c",
                vec![
                    doc("a1", vec![1.0], &[], "a.rs"),
                    doc("a2", vec![1.0], &[], "a.rs"),
                    ts,
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            store
                .delete_by_predicate("c", &DocumentFilter::for_path("a.rs"))
                .await
                .unwrap(),
            2
        );
        let filter = DocumentFilter {
            relative_path: None,
            file_extensions: Some(vec![".ts".to_string()]),
        };
        assert_eq!(store.delete_by_predicate("c", &filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn collections_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = SqliteVectorStore::open(&path).unwrap();
            store.ensure_collection("c", 3).await.unwrap();
            store
                .upsert("c", vec![doc("a", vec![1.0, 0.0, 0.0], &["kw"], "a.rs")])
                .await
                .unwrap();
        }

        let reopened = SqliteVectorStore::open(&path).unwrap();
        assert_eq!(reopened.collection_dimension("c").await.unwrap(), Some(3));
        let hits = reopened
            .query(
                "c",
                QueryRequest::sparse(vec!["kw".to_string()], 10, None),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn query_on_missing_collection_is_an_error() {
        let (store, _dir) = store();
        let err = store
            .query("absent", QueryRequest::dense(vec![1.0], 5, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VectorStore { .. }));
    }
}
