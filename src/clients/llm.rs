//! OpenAI-compatible chat completion client
//!
//! Two operations: free-text completion for answer generation, and
//! strict-JSON classification for routing and grading. Classification
//! parsing is an explicit step returning a result value; substituting a
//! safe default on parse failure is the caller's decision, not this
//! client's.

use crate::errors::{AgentError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request timeout (30 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Structured verdict returned by `classify`.
///
/// The router prompt answers with `{"type": ..., "reason": ...}` and the
/// grader prompt with `{"score": ..., "reason": ...}`; both shapes map
/// onto `label`.
#[derive(Debug, Clone, Deserialize)]
pub struct Classification {
    #[serde(alias = "type", alias = "score")]
    pub label: String,
    #[serde(default)]
    pub reason: String,
}

/// Chat-completion interface consumed by the pipeline
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Free-text generation
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String>;

    /// Strict machine-parseable classification at temperature zero
    async fn classify(&self, system: &str, user: &str) -> Result<Classification>;
}

/// Client for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    /// Model used for answer generation
    chat_model: String,
    /// Smaller model used for classification calls
    router_model: String,
}

impl LlmClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        chat_model: &str,
        router_model: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(AgentError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            chat_model: chat_model.to_string(),
            router_model: router_model.to_string(),
        })
    }

    async fn chat(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: f32,
        json_mode: bool,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature,
            response_format: json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::CompletionError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::CompletionError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::CompletionError(format!("Failed to parse response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AgentError::CompletionError("Empty choices in response".to_string()))
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn router_model(&self) -> &str {
        &self.router_model
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        self.chat(&self.chat_model, system, user, temperature, false)
            .await
    }

    async fn classify(&self, system: &str, user: &str) -> Result<Classification> {
        let raw = self
            .chat(&self.router_model, system, user, 0.0, true)
            .await?;
        parse_classification(&raw)
    }
}

/// Parse a classifier response that must be a single JSON object.
///
/// Models sometimes wrap JSON in a markdown code fence; that much is
/// tolerated. Anything else is a malformed response for the caller to
/// handle with its site-specific default.
pub fn parse_classification(raw: &str) -> Result<Classification> {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(trimmed)
        .map_err(|e| AgentError::MalformedResponse(format!("{}: {}", e, trimmed)))
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = LlmClient::new(
            "https://api.example.com/v1/",
            "key",
            "qwen3-max",
            "qwen-turbo",
        )
        .unwrap();
        assert_eq!(client.chat_model(), "qwen3-max");
        assert_eq!(client.router_model(), "qwen-turbo");
    }

    #[test]
    fn test_parse_router_verdict() {
        let c = parse_classification(r#"{"type": "rag", "reason": "VPN failure"}"#).unwrap();
        assert_eq!(c.label, "rag");
        assert_eq!(c.reason, "VPN failure");
    }

    #[test]
    fn test_parse_grader_verdict() {
        let c = parse_classification(r#"{"score": "yes", "reason": "matches the steps"}"#).unwrap();
        assert_eq!(c.label, "yes");
    }

    #[test]
    fn test_parse_fenced_json() {
        let c = parse_classification("```json\n{\"type\": \"chat\"}\n```").unwrap();
        assert_eq!(c.label, "chat");
        assert_eq!(c.reason, "");
    }

    #[test]
    fn test_parse_malformed_is_error() {
        let result = parse_classification("sure, this looks like rag to me");
        assert!(matches!(result, Err(AgentError::MalformedResponse(_))));
    }
}
