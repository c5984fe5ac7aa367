//! Embedding capability.

use crate::domain::error::{Error, Result};
use async_trait::async_trait;

/// Contract for services that turn text into dense vectors.
///
/// `dimension` must be finite and positive before any `embed*` call; every
/// returned vector has exactly that length. Network and rate-limit failures
/// surface as retryable [`Error::Embedding`]; invalid input (an empty batch,
/// oversize token counts) is permanent.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. The result has one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::embedding_permanent("provider returned no embedding"))
    }

    /// Declared vector length.
    fn dimension(&self) -> usize;

    /// Stable provider tag used in logs and collection-compatibility checks.
    fn provider_id(&self) -> &str;
}
