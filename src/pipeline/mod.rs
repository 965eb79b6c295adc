//! Pipeline orchestration: the fixed QA state machine that sequences
//! rewrite, routing, retrieval, gating, generation, grading and the
//! web-search fallback.

pub mod orchestrator;
pub mod prompts;
pub mod state;

pub use orchestrator::{Pipeline, PipelineConfig, PipelineOutcome};
pub use state::{GeneratedAnswer, Grounding, PipelineStage, PipelineState, Route, StageEvent};
