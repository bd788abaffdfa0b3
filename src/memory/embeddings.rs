//! Embedding Gateway
//!
//! Turns text into fixed-dimension vectors via the OpenAI embeddings API.
//! Input is cleaned (newlines stripped, truncated to a rough token limit)
//! before the call; transient failures retry with the shared backoff.

use serde_json::{json, Value};

use crate::ai::providers::{build_client, classify_error_response, with_retry};
use crate::ai::AiError;
use crate::config::Settings;

use super::EmbeddingError;

/// Rough character cap standing in for the embedding model's token limit.
const MAX_INPUT_CHARS: usize = 8000;

/// Embedding provider trait
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Fixed output dimension.
    fn dimensions(&self) -> usize;
}

/// OpenAI embeddings backend.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddings {
    pub fn from_settings(settings: &Settings) -> Result<Self, EmbeddingError> {
        let api_key = settings
            .openai_api_key
            .clone()
            .ok_or(AiError::MissingApiKey {
                key: "OPENAI_API_KEY",
            })?;

        Ok(Self {
            client: build_client(30).map_err(EmbeddingError::Provider)?,
            api_key,
            base_url: settings.openai_base_url.clone(),
            model: settings.openai_embedding_model.clone(),
            dimension: settings.embedding_dimension,
        })
    }

    async fn request(&self, input: &str) -> Result<Vec<f32>, AiError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "input": input,
                "encoding_format": "float",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        let embedding = value["data"]
            .get(0)
            .and_then(|d| d["embedding"].as_array())
            .ok_or_else(|| AiError::MalformedResponse("missing embedding data".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect();

        Ok(embedding)
    }
}

/// Strip newlines and truncate before sending to the provider.
pub(crate) fn clean_input(text: &str) -> String {
    let cleaned = text.replace('\n', " ");
    let cleaned = cleaned.trim();
    if cleaned.len() > MAX_INPUT_CHARS {
        let mut end = MAX_INPUT_CHARS;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned[..end].to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = clean_input(text);
        let embedding = with_retry("openai embed", || self.request(&input)).await?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_input_strips_newlines_and_trims() {
        assert_eq!(clean_input("  hello\nworld\n "), "hello world");
    }

    #[test]
    fn test_clean_input_truncates_long_text() {
        let long = "a".repeat(10_000);
        assert_eq!(clean_input(&long).len(), 8000);
    }

    #[test]
    fn test_clean_input_respects_char_boundaries() {
        let long = "é".repeat(5000); // 2 bytes per char
        let cleaned = clean_input(&long);
        assert!(cleaned.len() <= 8000);
        assert!(cleaned.is_char_boundary(cleaned.len()));
    }
}
