//! Embedding provider implementations.
//!
//! Each provider trades quality, cost, and privacy differently:
//!
//! | Provider | Default model | Dimensions | Deployment |
//! |----------|--------------|------------|------------|
//! | [`OpenAiEmbeddingProvider`] | text-embedding-3-small | 1536 | Cloud |
//! | [`VoyageEmbeddingProvider`] | voyage-code-3 | 1024 | Cloud, code-tuned |
//! | [`GeminiEmbeddingProvider`] | text-embedding-004 | 768 | Cloud |
//! | [`OllamaEmbeddingProvider`] | nomic-embed-text | 768 | Local server |
//! | [`HashingEmbeddingProvider`] | n/a | 64 | In-process, offline |

pub mod gemini;
pub mod hashing;
pub mod ollama;
pub mod openai;
pub mod voyage;

pub use gemini::GeminiEmbeddingProvider;
pub use hashing::HashingEmbeddingProvider;
pub use ollama::OllamaEmbeddingProvider;
pub use openai::OpenAiEmbeddingProvider;
pub use voyage::VoyageEmbeddingProvider;

use crate::config::EmbeddingConfig;
use crate::domain::error::{Error, Result};
use crate::domain::ports::EmbeddingProvider;
use crate::domain::types::EmbeddingProviderKind;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Maximum attempts for a retryable embedding call.
pub const MAX_EMBED_ATTEMPTS: u32 = 3;

/// Build the configured embedding provider.
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let api_key = |fallback_var: &str| -> Result<String> {
        config
            .api_key
            .clone()
            .or_else(|| std::env::var(fallback_var).ok())
            .ok_or_else(|| {
                Error::config(format!(
                    "{} requires an API key (EMBEDDING_API_KEY or {fallback_var})",
                    config.provider
                ))
            })
    };

    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderKind::OpenAI => Arc::new(OpenAiEmbeddingProvider::new(
            api_key("OPENAI_API_KEY")?,
            config.model.clone(),
            config.dimension,
            config.base_url.clone(),
        )),
        EmbeddingProviderKind::Voyage => Arc::new(VoyageEmbeddingProvider::new(
            api_key("VOYAGE_API_KEY")?,
            config.model.clone(),
            config.dimension,
        )),
        EmbeddingProviderKind::Gemini => Arc::new(GeminiEmbeddingProvider::new(
            api_key("GEMINI_API_KEY")?,
            config.model.clone(),
            config.dimension,
        )),
        EmbeddingProviderKind::Ollama => Arc::new(OllamaEmbeddingProvider::new(
            config.base_url.clone(),
            config.model.clone(),
            config.dimension,
        )),
        EmbeddingProviderKind::Hashing => {
            Arc::new(HashingEmbeddingProvider::new(config.dimension.unwrap_or(64)))
        }
    };
    Ok(provider)
}

/// Embed a batch with bounded exponential backoff on retryable failures.
pub async fn embed_batch_with_retry(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let mut delay = Duration::from_millis(200);
    let mut attempt = 1;
    loop {
        match provider.embed_batch(texts).await {
            Ok(vectors) => return Ok(vectors),
            Err(err) if err.is_retryable() && attempt < MAX_EMBED_ATTEMPTS => {
                warn!(
                    provider = provider.provider_id(),
                    attempt,
                    error = %err,
                    "embedding call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Reject the inputs every provider treats as permanently invalid.
pub(crate) fn validate_batch(texts: &[String]) -> Result<()> {
    if texts.is_empty() {
        return Err(Error::embedding_permanent("empty embedding batch"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        calls: AtomicU32,
        fail_times: u32,
        retryable: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(if self.retryable {
                    Error::embedding_retryable("flake")
                } else {
                    Error::embedding_permanent("broken")
                });
            }
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn provider_id(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn retryable_failures_are_retried_up_to_the_cap() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            fail_times: 2,
            retryable: true,
        };
        let out = embed_batch_with_retry(&provider, &["a".to_string()]).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_abort_immediately() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            fail_times: 5,
            retryable: false,
        };
        let err = embed_batch_with_retry(&provider, &["a".to_string()]).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_the_last_error() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            fail_times: 10,
            retryable: true,
        };
        let err = embed_batch_with_retry(&provider, &["a".to_string()]).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(provider.calls.load(Ordering::SeqCst), MAX_EMBED_ATTEMPTS);
    }
}
