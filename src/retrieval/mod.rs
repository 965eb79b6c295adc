//! Two-stage retrieval: coarse hybrid recall, cross-encoder rerank, and
//! the quality gate that decides whether retrieved documents are
//! trustworthy enough to generate from.

pub mod document;
pub mod gate;
pub mod retriever;
pub mod sparse;

pub use document::{Document, Provenance, RetrievalResult};
pub use gate::{GateDecision, RetrievalGate};
pub use retriever::TwoStageRetriever;
pub use sparse::{SparseEncoder, SparseVector};
