//! Deterministic in-process embedding provider.
//!
//! Buckets tokens into a fixed-size bag-of-words vector and L2-normalizes.
//! Not a semantic model, but deterministic, offline, and monotone in token
//! overlap, which is what tests and keyless local setups need.

use crate::application::planner::tokenize;
use crate::domain::error::Result;
use crate::domain::ports::EmbeddingProvider;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Offline bag-of-words embedding.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider with the given vector length.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimension;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        super::validate_batch(texts)?;
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_id(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic_and_sized() {
        let provider = HashingEmbeddingProvider::new(32);
        let a = provider.embed("fn add(a, b)").await.unwrap();
        let b = provider.embed("fn add(a, b)").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn token_overlap_raises_similarity() {
        let provider = HashingEmbeddingProvider::new(64);
        let query = provider.embed("add numbers").await.unwrap();
        let close = provider.embed("function add numbers together").await.unwrap();
        let far = provider.embed("remove entries").await.unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&query, &close) > dot(&query, &far));
    }

    #[tokio::test]
    async fn empty_batch_is_a_permanent_error() {
        let provider = HashingEmbeddingProvider::new(8);
        let err = provider.embed_batch(&[]).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
