//! Hybrid query planner: shared tokenizer, dense + sparse subqueries, and
//! score fusion.
//!
//! Reciprocal Rank Fusion is the default strategy: a document's fused score
//! is `Σ 1/(k + rank)` over the lists it appears in, with `k = 60`. The same
//! tokenizer runs at ingestion and at query time so the sparse leg scores
//! against identical terms.

use crate::domain::error::Result;
use crate::domain::ports::vector_store::{DocumentFilter, QueryRequest};
use crate::domain::ports::VectorStore;
use crate::domain::types::{HybridDocument, RerankStrategy, ScoredDocument};
use std::collections::HashMap;

/// RRF rank-smoothing constant.
pub const RRF_K: f32 = 60.0;
/// Dense weight for the weighted-sum strategy.
const WEIGHTED_SUM_DENSE: f32 = 0.7;
/// Sparse weight for the weighted-sum strategy.
const WEIGHTED_SUM_SPARSE: f32 = 0.3;

/// Words too common to carry signal in either leg.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "not", "but", "has",
    "have", "had", "you", "your", "its", "can", "will", "all", "any", "into", "out",
];

/// Tokenize text the same way for ingestion and queries.
///
/// Lowercases, splits on non-identifier characters, then further splits
/// identifiers on `_` and camelCase boundaries so `addNumbers` also yields
/// `add` and `numbers`. Stopwords and one-character tokens are dropped;
/// duplicates are preserved (BM25 needs term frequencies).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if raw.is_empty() {
            continue;
        }
        let subtokens = split_identifier(raw);
        let whole = raw.to_lowercase();
        if subtokens.len() > 1 && keep_token(&whole) {
            tokens.push(whole);
        }
        for sub in subtokens {
            let sub = sub.to_lowercase();
            if keep_token(&sub) {
                tokens.push(sub);
            }
        }
    }
    tokens
}

fn keep_token(token: &str) -> bool {
    token.chars().count() >= 2 && !STOPWORDS.contains(&token)
}

/// Split an identifier on underscores and lower→upper camelCase boundaries.
fn split_identifier(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for piece in raw.split('_') {
        if piece.is_empty() {
            continue;
        }
        let mut current = String::new();
        let mut previous_lower = false;
        for ch in piece.chars() {
            if ch.is_uppercase() && previous_lower && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            previous_lower = ch.is_lowercase() || ch.is_numeric();
            current.push(ch);
        }
        if !current.is_empty() {
            parts.push(current);
        }
    }
    parts
}

/// Planner inputs beyond the query itself.
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    /// Maximum hits to return
    pub limit: usize,
    /// Minimum dense similarity; sparse-only hits are exempt
    pub threshold: f32,
    /// Fusion strategy
    pub strategy: RerankStrategy,
    /// Metadata predicate applied to both legs
    pub filter: Option<DocumentFilter>,
}

/// A fused hit with its per-leg scores.
#[derive(Debug, Clone)]
pub struct FusedHit {
    /// The stored document
    pub document: HybridDocument,
    /// Score under the selected fusion strategy
    pub fused_score: f32,
    /// Cosine similarity when the dense leg returned the document
    pub dense_score: Option<f32>,
    /// BM25 score when the sparse leg returned the document
    pub sparse_score: Option<f32>,
}

/// Execute both retrieval legs and fuse the results.
pub async fn execute(
    store: &dyn VectorStore,
    collection: &str,
    query_vector: Vec<f32>,
    query_terms: Vec<String>,
    options: &PlannerOptions,
) -> Result<Vec<FusedHit>> {
    let candidates = (options.limit * 4).max(50);

    let dense = if options.strategy == RerankStrategy::SparseOnly {
        Vec::new()
    } else {
        store
            .query(
                collection,
                QueryRequest::dense(query_vector, candidates, options.filter.clone()),
            )
            .await?
    };

    let sparse = if options.strategy == RerankStrategy::DenseOnly {
        Vec::new()
    } else {
        store
            .query(
                collection,
                QueryRequest::sparse(query_terms, candidates, options.filter.clone()),
            )
            .await?
    };

    let mut hits = fuse(dense, sparse, options.strategy);

    // The threshold applies only to the dense component; documents that were
    // never dense candidates survive on their sparse merit.
    hits.retain(|hit| match hit.dense_score {
        Some(dense) => dense >= options.threshold,
        None => true,
    });

    hits.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| {
                b.dense_score
                    .unwrap_or(f32::MIN)
                    .total_cmp(&a.dense_score.unwrap_or(f32::MIN))
            })
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
    hits.truncate(options.limit);
    Ok(hits)
}

/// Combine the two ranked lists under a strategy.
pub fn fuse(
    dense: Vec<ScoredDocument>,
    sparse: Vec<ScoredDocument>,
    strategy: RerankStrategy,
) -> Vec<FusedHit> {
    let mut merged: HashMap<String, FusedHit> = HashMap::new();

    let dense_max = dense.iter().map(|d| d.score).fold(f32::MIN, f32::max);
    let dense_min = dense.iter().map(|d| d.score).fold(f32::MAX, f32::min);
    let sparse_max = sparse.iter().map(|d| d.score).fold(f32::MIN, f32::max);
    let sparse_min = sparse.iter().map(|d| d.score).fold(f32::MAX, f32::min);

    for (rank, scored) in dense.into_iter().enumerate() {
        let entry = merged
            .entry(scored.document.id.clone())
            .or_insert_with(|| FusedHit {
                document: scored.document,
                fused_score: 0.0,
                dense_score: None,
                sparse_score: None,
            });
        entry.dense_score = Some(scored.score);
        entry.fused_score += match strategy {
            RerankStrategy::Rrf => 1.0 / (RRF_K + rank as f32 + 1.0),
            RerankStrategy::WeightedSum => {
                WEIGHTED_SUM_DENSE * normalize(scored.score, dense_min, dense_max)
            }
            RerankStrategy::DenseOnly => scored.score,
            RerankStrategy::SparseOnly => 0.0,
        };
    }

    for (rank, scored) in sparse.into_iter().enumerate() {
        let entry = merged
            .entry(scored.document.id.clone())
            .or_insert_with(|| FusedHit {
                document: scored.document,
                fused_score: 0.0,
                dense_score: None,
                sparse_score: None,
            });
        entry.sparse_score = Some(scored.score);
        entry.fused_score += match strategy {
            RerankStrategy::Rrf => 1.0 / (RRF_K + rank as f32 + 1.0),
            RerankStrategy::WeightedSum => {
                WEIGHTED_SUM_SPARSE * normalize(scored.score, sparse_min, sparse_max)
            }
            RerankStrategy::DenseOnly => 0.0,
            RerankStrategy::SparseOnly => scored.score,
        };
    }

    merged.into_values().collect()
}

/// Min-max normalization; degenerate ranges collapse to 1.0.
fn normalize(score: f32, min: f32, max: f32) -> f32 {
    if max <= min {
        1.0
    } else {
        (score - min) / (max - min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ChunkMetadata;

    fn doc(id: &str) -> HybridDocument {
        HybridDocument {
            id: id.to_string(),
            dense_vector: vec![1.0],
            keywords: Vec::new(),
            content: String::new(),
            metadata: ChunkMetadata {
                relative_path: format!("{id}.rs"),
                start_line: 1,
                end_line: 1,
                language: "rust".to_string(),
                file_extension: ".rs".to_string(),
                node_kind: None,
            },
        }
    }

    fn scored(id: &str, score: f32) -> ScoredDocument {
        ScoredDocument {
            document: doc(id),
            score,
        }
    }

    #[test]
    fn tokenize_splits_identifiers_and_drops_noise() {
        let tokens = tokenize("function addNumbers(a, b) { return a + b; }");
        assert!(tokens.contains(&"function".to_string()));
        assert!(tokens.contains(&"addnumbers".to_string()));
        assert!(tokens.contains(&"add".to_string()));
        assert!(tokens.contains(&"numbers".to_string()));
        assert!(!tokens.contains(&"a".to_string()));
        assert!(!tokens.contains(&"the".to_string()));

        let snake = tokenize("compute_content_hash");
        assert!(snake.contains(&"compute".to_string()));
        assert!(snake.contains(&"content".to_string()));
        assert!(snake.contains(&"hash".to_string()));
    }

    #[test]
    fn tokenize_preserves_duplicates_for_term_frequency() {
        let tokens = tokenize("retry retry retry");
        assert_eq!(tokens.iter().filter(|t| *t == "retry").count(), 3);
    }

    #[test]
    fn rrf_rewards_presence_in_both_lists() {
        // A is second in dense and first in sparse; B leads dense only.
        let dense = vec![scored("b", 0.9), scored("a", 0.8)];
        let sparse = vec![scored("a", 5.0)];

        let hits = fuse(dense, sparse, RerankStrategy::Rrf);
        let a = hits.iter().find(|h| h.document.id == "a").unwrap();
        let b = hits.iter().find(|h| h.document.id == "b").unwrap();

        let expected_a = 1.0 / (RRF_K + 2.0) + 1.0 / (RRF_K + 1.0);
        let expected_b = 1.0 / (RRF_K + 1.0);
        assert!((a.fused_score - expected_a).abs() < 1e-6);
        assert!((b.fused_score - expected_b).abs() < 1e-6);
        assert!(a.fused_score > b.fused_score);
    }

    #[test]
    fn dense_only_and_sparse_only_pass_scores_through() {
        let dense = vec![scored("a", 0.8)];
        let sparse = vec![scored("b", 3.0)];

        let hits = fuse(dense.clone(), sparse.clone(), RerankStrategy::DenseOnly);
        let a = hits.iter().find(|h| h.document.id == "a").unwrap();
        assert_eq!(a.fused_score, 0.8);
        let b = hits.iter().find(|h| h.document.id == "b").unwrap();
        assert_eq!(b.fused_score, 0.0);

        let hits = fuse(dense, sparse, RerankStrategy::SparseOnly);
        let b = hits.iter().find(|h| h.document.id == "b").unwrap();
        assert_eq!(b.fused_score, 3.0);
    }

    #[test]
    fn weighted_sum_normalizes_each_list() {
        let dense = vec![scored("a", 0.9), scored("b", 0.1)];
        let sparse = vec![scored("b", 2.0), scored("a", 1.0)];

        let hits = fuse(dense, sparse, RerankStrategy::WeightedSum);
        let a = hits.iter().find(|h| h.document.id == "a").unwrap();
        let b = hits.iter().find(|h| h.document.id == "b").unwrap();
        // a: dense 1.0 * 0.7 + sparse 0.0 * 0.3 = 0.7
        // b: dense 0.0 * 0.7 + sparse 1.0 * 0.3 = 0.3
        assert!((a.fused_score - 0.7).abs() < 1e-6);
        assert!((b.fused_score - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn execute_applies_threshold_to_dense_hits_only() {
        use crate::domain::ports::VectorStore;
        use crate::providers::vector_store::InMemoryVectorStore;

        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();

        let mut strong = doc("strong");
        strong.dense_vector = vec![1.0, 0.0];
        let mut weak = doc("weak");
        weak.dense_vector = vec![-1.0, 0.0];
        weak.keywords = vec!["special".to_string(), "token".to_string()];
        store.upsert("c", vec![strong, weak]).await.unwrap();

        let options = PlannerOptions {
            limit: 10,
            threshold: 0.3,
            strategy: RerankStrategy::Rrf,
            filter: None,
        };
        let hits = execute(
            &store,
            "c",
            vec![1.0, 0.0],
            vec!["special".to_string()],
            &options,
        )
        .await
        .unwrap();

        // "weak" appears in the dense candidate list with similarity -1.0,
        // below the threshold, so it is dropped despite its sparse hit.
        assert!(hits.iter().any(|h| h.document.id == "strong"));
        assert!(!hits.iter().any(|h| h.document.id == "weak"));

        // Under sparse-only fusion no dense leg runs, so the same document
        // survives purely on its sparse merit.
        let sparse_options = PlannerOptions {
            strategy: RerankStrategy::SparseOnly,
            ..options
        };
        let hits = execute(
            &store,
            "c",
            vec![1.0, 0.0],
            vec!["special".to_string()],
            &sparse_options,
        )
        .await
        .unwrap();
        let weak_hit = hits.iter().find(|h| h.document.id == "weak").unwrap();
        assert!(weak_hit.sparse_score.is_some());
        assert!(weak_hit.dense_score.is_none());
    }

    #[tokio::test]
    async fn execute_drops_subthreshold_dense_only_hits() {
        use crate::domain::ports::VectorStore;
        use crate::providers::vector_store::InMemoryVectorStore;

        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        let mut weak = doc("weak");
        weak.dense_vector = vec![-1.0, 0.0];
        store.upsert("c", vec![weak]).await.unwrap();

        let options = PlannerOptions {
            limit: 10,
            threshold: 0.3,
            strategy: RerankStrategy::Rrf,
            filter: None,
        };
        let hits = execute(&store, "c", vec![1.0, 0.0], vec![], &options)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn ties_break_by_dense_score_then_id() {
        let mut hits = vec![
            FusedHit {
                document: doc("zz"),
                fused_score: 1.0,
                dense_score: Some(0.5),
                sparse_score: None,
            },
            FusedHit {
                document: doc("aa"),
                fused_score: 1.0,
                dense_score: Some(0.5),
                sparse_score: None,
            },
            FusedHit {
                document: doc("mm"),
                fused_score: 1.0,
                dense_score: Some(0.9),
                sparse_score: None,
            },
        ];
        hits.sort_by(|a, b| {
            b.fused_score
                .total_cmp(&a.fused_score)
                .then_with(|| {
                    b.dense_score
                        .unwrap_or(f32::MIN)
                        .total_cmp(&a.dense_score.unwrap_or(f32::MIN))
                })
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["mm", "aa", "zz"]);
    }
}
