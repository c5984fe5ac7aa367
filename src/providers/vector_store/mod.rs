//! Vector store implementations.
//!
//! Both backends execute the same two retrieval legs: brute-force cosine over
//! dense vectors and BM25 over keyword posting lists. [`InMemoryVectorStore`]
//! is the reference implementation used by tests; [`SqliteVectorStore`] is
//! the persistent local default. Scoring lives here so the backends cannot
//! drift apart.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::config::{default_state_dir, VectorStoreConfig};
use crate::domain::error::{Error, Result};
use crate::domain::ports::VectorStore;
use crate::domain::types::{ScoredDocument, VectorStoreProviderKind};
use std::collections::HashMap;
use std::sync::Arc;

/// BM25 term-saturation parameter.
const BM25_K1: f32 = 1.2;
/// BM25 length-normalization parameter.
const BM25_B: f32 = 0.75;

/// Build the configured vector store.
pub fn create_vector_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.provider {
        VectorStoreProviderKind::SqliteVec => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(|| default_state_dir().join("code-context.db"));
            Ok(Arc::new(SqliteVectorStore::open(path)?))
        }
        VectorStoreProviderKind::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        VectorStoreProviderKind::Milvus => Err(Error::config(
            "milvus is recognized but not bundled in this build; use sqlite-vec or memory",
        )),
    }
}

/// Cosine similarity; zero when either vector has zero norm.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// BM25 scores for every candidate against the query terms.
///
/// `candidates` holds each document's keyword list; document and corpus
/// statistics are computed over the candidate set (the collection after
/// filtering), which keeps both backends exact and identical.
pub(crate) fn bm25_scores(candidates: &[&[String]], terms: &[String]) -> Vec<f32> {
    let n = candidates.len();
    if n == 0 || terms.is_empty() {
        return vec![0.0; n];
    }

    let avgdl: f32 =
        candidates.iter().map(|kw| kw.len() as f32).sum::<f32>() / n as f32;
    let avgdl = avgdl.max(1.0);

    // Term frequencies per document and document frequencies per term.
    let mut tf: Vec<HashMap<&str, f32>> = Vec::with_capacity(n);
    for keywords in candidates {
        let mut counts: HashMap<&str, f32> = HashMap::new();
        for keyword in keywords.iter() {
            *counts.entry(keyword.as_str()).or_insert(0.0) += 1.0;
        }
        tf.push(counts);
    }

    terms
        .iter()
        .fold(vec![0.0f32; n], |mut scores, term| {
            let df = tf.iter().filter(|counts| counts.contains_key(term.as_str())).count() as f32;
            if df == 0.0 {
                return scores;
            }
            let idf = (1.0 + (n as f32 - df + 0.5) / (df + 0.5)).ln();
            for (i, counts) in tf.iter().enumerate() {
                if let Some(&freq) = counts.get(term.as_str()) {
                    let dl = candidates[i].len() as f32;
                    let denominator = freq + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl);
                    scores[i] += idf * freq * (BM25_K1 + 1.0) / denominator;
                }
            }
            scores
        })
}

/// Sort by score descending (id ascending on ties) and truncate.
pub(crate) fn top_k(mut scored: Vec<ScoredDocument>, k: usize) -> Vec<ScoredDocument> {
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn bm25_prefers_documents_containing_the_terms() {
        let with: Vec<String> = ["add", "numbers", "function"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let without: Vec<String> = ["remove", "entries", "function"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let candidates: Vec<&[String]> = vec![&with, &without];

        let scores = bm25_scores(&candidates, &["add".to_string(), "numbers".to_string()]);
        assert!(scores[0] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn bm25_handles_empty_inputs() {
        assert!(bm25_scores(&[], &["x".to_string()]).is_empty());
        let keywords: Vec<String> = vec!["a".to_string()];
        let candidates: Vec<&[String]> = vec![&keywords];
        assert_eq!(bm25_scores(&candidates, &[]), vec![0.0]);
    }
}
