//! Thin adapters over external network services
//!
//! Each adapter is a reqwest (or qdrant-client) wrapper behind an
//! `async_trait` seam, so the pipeline and retriever receive injected
//! dependency objects and tests can substitute mocks.

pub mod embedding;
pub mod index;
pub mod llm;
pub mod notify;
pub mod search;

pub use embedding::{EmbeddingProvider, GeminiEmbedClient};
pub use index::{DocumentIndex, QdrantIndex};
pub use llm::{Classification, CompletionProvider, LlmClient};
pub use notify::{AlertSink, WebhookNotifier};
pub use search::{SearchHit, TavilyClient, WebSearchProvider};
