//! Embedding API client
//!
//! Calls a Gemini-style `embedContent` endpoint with the retrieval-query
//! task type. Failures surface as errors here; the scoring gateway is
//! the layer that converts them into the abandon-retrieval sentinel.

use crate::errors::{AgentError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Dense embedding interface
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Client for the Google generative-language embedding endpoint
#[derive(Debug, Clone)]
pub struct GeminiEmbedClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiEmbedClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(AgentError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = EmbedRequest {
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.trim().to_string(),
                }],
            },
            task_type: "RETRIEVAL_QUERY".to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::EmbeddingError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::EmbeddingError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| AgentError::EmbeddingError(format!("Failed to parse response: {}", e)))?;

        if parsed.embedding.values.is_empty() {
            return Err(AgentError::EmbeddingError(
                "Empty embedding in response".to_string(),
            ));
        }

        Ok(parsed.embedding.values)
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Debug, Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GeminiEmbedClient::new(
            "https://generativelanguage.googleapis.com/v1beta/",
            "key",
            "text-embedding-004",
        )
        .unwrap();
        assert_eq!(client.model(), "text-embedding-004");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"embedding": {"values": [0.1, -0.2, 0.3]}}"#;
        let parsed: EmbedResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.embedding.values.len(), 3);
    }
}
