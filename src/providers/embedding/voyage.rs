//! Voyage AI embeddings API adapter.

use crate::domain::error::{Error, Result};
use crate::domain::ports::EmbeddingProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://api.voyageai.com/v1";
const DEFAULT_MODEL: &str = "voyage-code-3";
const MAX_INPUTS_PER_REQUEST: usize = 128;

fn default_dimension(model: &str) -> Option<usize> {
    match model {
        "voyage-code-3" | "voyage-3" | "voyage-code-2" => Some(1024),
        "voyage-3-lite" => Some(512),
        _ => None,
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    input_type: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Voyage `/embeddings` client (code-tuned models).
pub struct VoyageEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
}

impl VoyageEmbeddingProvider {
    /// Create a provider; unknown models need an explicit dimension.
    pub fn new(api_key: String, model: Option<String>, dimension: Option<usize>) -> Self {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let dimension = dimension
            .or_else(|| default_dimension(&model))
            .unwrap_or(1024);
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for VoyageEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        super::validate_batch(texts)?;
        let mut vectors = Vec::with_capacity(texts.len());
        for sub_batch in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            let response = self
                .client
                .post(format!("{BASE_URL}/embeddings"))
                .bearer_auth(&self.api_key)
                .json(&EmbeddingsRequest {
                    model: &self.model,
                    input: sub_batch,
                    input_type: "document",
                })
                .send()
                .await?
                .error_for_status()?;

            let body: EmbeddingsResponse = response.json().await?;
            if body.data.len() != sub_batch.len() {
                return Err(Error::embedding_permanent(format!(
                    "voyage returned {} embeddings for {} inputs",
                    body.data.len(),
                    sub_batch.len()
                )));
            }
            vectors.extend(body.data.into_iter().map(|d| d.embedding));
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_id(&self) -> &str {
        "voyage"
    }
}
