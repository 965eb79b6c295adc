//! DeskBuddy - Internal IT Support Agent
//!
//! A retrieval-augmented QA agent for internal IT support. Questions are
//! rewritten for retrieval, routed by intent, answered from a hybrid
//! dense+sparse knowledge-base index with cross-encoder reranking and a
//! score gate, graded for hallucination, and backed by an external
//! web-search fallback when the knowledge base has no trusted record.
//!
//! # Architecture
//!
//! - `clients`: thin typed clients for every external service
//! - `scoring`: cross-encoder inference and the scoring gateway
//! - `retrieval`: sparse encoding, two-stage retrieval, quality gate
//! - `grading`: hallucination grading of generated answers
//! - `pipeline`: the fixed state machine that sequences it all

pub mod clients;
pub mod config;
pub mod errors;
pub mod grading;
pub mod pipeline;
pub mod retrieval;
pub mod scoring;

// Re-export commonly used types
pub use errors::{AgentError, Result};
