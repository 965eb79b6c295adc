//! Error types for the deskbuddy agent
//!
//! Upstream service failures are recoverable by design: each pipeline
//! stage degrades route-specifically instead of crashing. This enum is
//! what reaches the top level when no degrade applies.

use thiserror::Error;

/// Main error type for the agent pipeline
#[derive(Error, Debug)]
pub enum AgentError {
    /// State machine transition errors
    #[error("Invalid stage transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Chat completion API errors
    #[error("Completion API error: {0}")]
    CompletionError(String),

    /// Classifier returned output that is not the requested strict JSON
    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),

    /// Embedding service errors
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Document index errors
    #[error("Document index error: {0}")]
    IndexError(String),

    /// Cross-encoder rerank errors
    #[error("Rerank error: {0}")]
    RerankError(String),

    /// Web search errors
    #[error("Web search error: {0}")]
    SearchError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic errors with context
    #[error("Agent error: {0}")]
    Generic(String),
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Convert anyhow errors to AgentError
impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Generic(err.to_string())
    }
}
