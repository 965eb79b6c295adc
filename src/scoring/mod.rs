//! Scoring gateway: dense embedding and cross-encoder reranking with
//! normalized, comparable confidence scores.

pub mod cross_encoder;
pub mod gateway;

pub use cross_encoder::{BertCrossEncoder, RerankScorer};
pub use gateway::ScoringGateway;
