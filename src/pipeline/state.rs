//! Pipeline state machine and per-invocation state record
//!
//! The transition graph is acyclic apart from the terminal self-loop, so
//! no stage can run twice in one invocation and the single
//! grade-to-web-search fallback bounds worst-case latency to two
//! generation calls.

use crate::clients::SearchHit;
use crate::errors::{AgentError, Result};
use crate::grading::GradeVerdict;
use crate::retrieval::{GateDecision, RetrievalResult};
use serde::{Deserialize, Serialize};

/// Pipeline execution stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    /// Rewrite the raw question into a retrieval-optimized phrase
    Rewrite,
    /// Classify intent into knowledge or chat
    Route,
    /// Two-stage knowledge-base retrieval
    Retrieve,
    /// Retrieval quality gate
    Gate,
    /// Generate from retrieved documents
    GenerateRag,
    /// Grade the generated answer for hallucination
    Grade,
    /// External web search fallback
    WebSearch,
    /// Generate from web search results
    GenerateSearch,
    /// Casual chat response
    GenerateChat,
    /// Terminal state
    Done,
}

/// Events that trigger stage transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    RewriteComplete,
    RoutedKnowledge,
    RoutedChat,
    Retrieved,
    GatePassed,
    GateFailed,
    AnswerGenerated,
    GenerationFailed,
    GradedGrounded,
    GradedUngrounded,
    SearchComplete,
    SearchFailed,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done)
    }

    /// Attempt a stage transition with validation.
    ///
    /// Valid transitions:
    /// 1.  Rewrite        → Route          (on: RewriteComplete)
    /// 2.  Route          → Retrieve       (on: RoutedKnowledge)
    /// 3.  Route          → GenerateChat   (on: RoutedChat)
    /// 4.  Retrieve       → Gate           (on: Retrieved)
    /// 5.  Gate           → GenerateRag    (on: GatePassed)
    /// 6.  Gate           → WebSearch      (on: GateFailed)
    /// 7.  GenerateRag    → Grade          (on: AnswerGenerated)
    /// 8.  GenerateRag    → WebSearch      (on: GenerationFailed)
    /// 9.  Grade          → Done           (on: GradedGrounded)
    /// 10. Grade          → WebSearch      (on: GradedUngrounded)
    /// 11. WebSearch      → GenerateSearch (on: SearchComplete)
    /// 12. WebSearch      → Done           (on: SearchFailed)
    /// 13. GenerateSearch → Done           (on: AnswerGenerated | GenerationFailed)
    /// 14. GenerateChat   → Done           (on: AnswerGenerated | GenerationFailed)
    /// 15. Done           → Done           (terminal self-loop)
    ///
    /// The graph is acyclic: in particular there is no edge from Grade
    /// back to Retrieve, so an ungrounded answer gets exactly one
    /// web-search fallback and never a retrieval retry.
    pub fn transition(&self, event: StageEvent) -> Result<PipelineStage> {
        use PipelineStage::*;
        use StageEvent::*;

        let next = match (self, event) {
            (Rewrite, RewriteComplete) => Route,

            (Route, RoutedKnowledge) => Retrieve,
            (Route, RoutedChat) => GenerateChat,

            (Retrieve, Retrieved) => Gate,

            (Gate, GatePassed) => GenerateRag,
            (Gate, GateFailed) => WebSearch,

            (GenerateRag, AnswerGenerated) => Grade,
            (GenerateRag, GenerationFailed) => WebSearch,

            (Grade, GradedGrounded) => Done,
            (Grade, GradedUngrounded) => WebSearch,

            (WebSearch, SearchComplete) => GenerateSearch,
            (WebSearch, SearchFailed) => Done,

            (GenerateSearch, AnswerGenerated) => Done,
            (GenerateSearch, GenerationFailed) => Done,

            (GenerateChat, AnswerGenerated) => Done,
            (GenerateChat, GenerationFailed) => Done,

            (Done, _) => Done,

            (from, event) => {
                return Err(AgentError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next)
    }

    /// Human-readable stage name
    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineStage::Rewrite => "Rewriting query",
            PipelineStage::Route => "Routing",
            PipelineStage::Retrieve => "Retrieving",
            PipelineStage::Gate => "Quality gate",
            PipelineStage::GenerateRag => "Generating (knowledge base)",
            PipelineStage::Grade => "Grading",
            PipelineStage::WebSearch => "Web search",
            PipelineStage::GenerateSearch => "Generating (web search)",
            PipelineStage::GenerateChat => "Generating (chat)",
            PipelineStage::Done => "Done",
        }
    }
}

/// Detected request intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Knowledge,
    Chat,
}

/// What a generated answer was grounded on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Grounding {
    /// Knowledge-base documents, by id
    Knowledge { document_ids: Vec<String> },
    /// Web search snippets
    Search { hits: Vec<SearchHit> },
    /// Casual chat, no grounding sources
    Chat,
    /// An honest degradation notice, not a generated answer
    Degraded,
}

/// Answer text plus the sources it was grounded on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub text: String,
    pub grounding: Grounding,
}

/// Aggregate state carried through one pipeline invocation.
/// One instance per request; never shared across concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub original_question: String,
    pub question: String,
    pub route: Option<Route>,
    pub documents: RetrievalResult,
    pub gate: Option<GateDecision>,
    pub answer: Option<GeneratedAnswer>,
    pub grade: Option<GradeVerdict>,
    /// Stages visited, in order, for diagnostics
    pub trace: Vec<PipelineStage>,
}

impl PipelineState {
    pub fn new(question: &str) -> Self {
        Self {
            original_question: question.to_string(),
            question: question.to_string(),
            ..Default::default()
        }
    }

    /// Record a visited stage in the trace
    pub fn visit(&mut self, stage: PipelineStage) {
        self.trace.push(stage);
    }

    pub fn visited(&self, stage: PipelineStage) -> bool {
        self.trace.contains(&stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knowledge_happy_path() {
        use PipelineStage::*;
        use StageEvent::*;

        let mut stage = Rewrite;
        for event in [
            RewriteComplete,
            RoutedKnowledge,
            Retrieved,
            GatePassed,
            AnswerGenerated,
            GradedGrounded,
        ] {
            stage = stage.transition(event).unwrap();
        }
        assert_eq!(stage, Done);
    }

    #[test]
    fn test_chat_path() {
        use PipelineStage::*;
        use StageEvent::*;

        let stage = Rewrite
            .transition(RewriteComplete)
            .and_then(|s| s.transition(RoutedChat))
            .and_then(|s| s.transition(AnswerGenerated))
            .unwrap();
        assert_eq!(stage, Done);
    }

    #[test]
    fn test_gate_fail_bypasses_generation() {
        use PipelineStage::*;
        use StageEvent::*;

        let stage = Gate.transition(GateFailed).unwrap();
        assert_eq!(stage, WebSearch);
    }

    #[test]
    fn test_ungrounded_goes_to_web_search_never_retrieve() {
        use PipelineStage::*;
        use StageEvent::*;

        assert_eq!(Grade.transition(GradedUngrounded).unwrap(), WebSearch);
        // No event takes WebSearch (or anything downstream) back to Retrieve.
        for event in [
            RewriteComplete,
            RoutedKnowledge,
            Retrieved,
            GatePassed,
            GateFailed,
            AnswerGenerated,
            GenerationFailed,
            GradedGrounded,
            GradedUngrounded,
            SearchComplete,
            SearchFailed,
        ] {
            if let Ok(next) = WebSearch.transition(event) {
                assert_ne!(next, Retrieve);
            }
        }
    }

    #[test]
    fn test_search_failure_terminates() {
        use PipelineStage::*;
        use StageEvent::*;

        assert_eq!(WebSearch.transition(SearchFailed).unwrap(), Done);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        use PipelineStage::*;
        use StageEvent::*;

        assert!(Retrieve.transition(GatePassed).is_err());
        assert!(Rewrite.transition(GradedGrounded).is_err());
    }

    #[test]
    fn test_done_is_terminal_self_loop() {
        use PipelineStage::*;
        use StageEvent::*;

        assert!(Done.is_terminal());
        assert_eq!(Done.transition(RewriteComplete).unwrap(), Done);
    }

    #[test]
    fn test_state_trace_records_visits() {
        let mut state = PipelineState::new("vpn down");
        state.visit(PipelineStage::Rewrite);
        state.visit(PipelineStage::Route);

        assert!(state.visited(PipelineStage::Rewrite));
        assert!(!state.visited(PipelineStage::Retrieve));
        assert_eq!(state.original_question, "vpn down");
    }
}
