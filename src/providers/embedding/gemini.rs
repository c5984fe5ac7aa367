//! Google Gemini embeddings API adapter.

use crate::domain::error::{Error, Result};
use crate::domain::ports::EmbeddingProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "text-embedding-004";
const MAX_INPUTS_PER_REQUEST: usize = 100;

fn default_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-004" => Some(768),
        _ => None,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct BatchResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini `batchEmbedContents` client.
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
}

impl GeminiEmbeddingProvider {
    /// Create a provider; unknown models need an explicit dimension.
    pub fn new(api_key: String, model: Option<String>, dimension: Option<usize>) -> Self {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let dimension = dimension
            .or_else(|| default_dimension(&model))
            .unwrap_or(768);
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        super::validate_batch(texts)?;
        let mut vectors = Vec::with_capacity(texts.len());
        for sub_batch in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            let request = BatchRequest {
                requests: sub_batch
                    .iter()
                    .map(|text| EmbedRequest {
                        model: format!("models/{}", self.model),
                        content: Content {
                            parts: vec![Part { text: text.clone() }],
                        },
                    })
                    .collect(),
            };

            let response = self
                .client
                .post(format!(
                    "{BASE_URL}/models/{}:batchEmbedContents?key={}",
                    self.model, self.api_key
                ))
                .json(&request)
                .send()
                .await?
                .error_for_status()?;

            let body: BatchResponse = response.json().await?;
            if body.embeddings.len() != sub_batch.len() {
                return Err(Error::embedding_permanent(format!(
                    "gemini returned {} embeddings for {} inputs",
                    body.embeddings.len(),
                    sub_batch.len()
                )));
            }
            vectors.extend(body.embeddings.into_iter().map(|e| e.values));
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_id(&self) -> &str {
        "gemini"
    }
}
