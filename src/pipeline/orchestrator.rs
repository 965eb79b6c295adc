//! Pipeline orchestrator
//!
//! Owns every control-flow decision: route selection, the retrieval
//! quality gate, hallucination grading, and the web-search fallback.
//! All external dependencies arrive injected at construction, so the
//! whole pipeline runs against mocks in tests.

use crate::clients::{AlertSink, CompletionProvider, WebSearchProvider};
use crate::grading::{GradeVerdict, HallucinationGrader};
use crate::pipeline::prompts::Prompts;
use crate::pipeline::state::{
    GeneratedAnswer, Grounding, PipelineStage, PipelineState, Route, StageEvent,
};
use crate::retrieval::{RetrievalGate, TwoStageRetriever};
use std::sync::Arc;
use tracing::{info, warn};

/// Honest degradation notices. The pipeline never fabricates an answer
/// over a failed upstream call.
const MSG_SEARCH_UNAVAILABLE: &str =
    "The web search service is currently unavailable and the internal knowledge base had no \
     trusted record for this question. An administrator has been alerted; please try again later.";
const MSG_ASSISTANT_UNAVAILABLE: &str =
    "The assistant is temporarily unavailable. An administrator has been alerted; please try \
     again later.";

/// Orchestrator tuning knobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Web search result count for the fallback path
    pub search_results: usize,
    /// Temperature for knowledge-base and search generation
    pub answer_temperature: f32,
    /// Temperature for casual chat replies
    pub chat_temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_results: 3,
            answer_temperature: 0.2,
            chat_temperature: 0.5,
        }
    }
}

/// Final answer plus the full per-invocation state for diagnostics
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub answer: GeneratedAnswer,
    pub state: PipelineState,
}

/// The QA pipeline state machine
pub struct Pipeline {
    llm: Arc<dyn CompletionProvider>,
    retriever: Arc<TwoStageRetriever>,
    gate: RetrievalGate,
    grader: HallucinationGrader,
    search: Arc<dyn WebSearchProvider>,
    alerts: Arc<dyn AlertSink>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        retriever: Arc<TwoStageRetriever>,
        gate: RetrievalGate,
        search: Arc<dyn WebSearchProvider>,
        alerts: Arc<dyn AlertSink>,
        config: PipelineConfig,
    ) -> Self {
        let grader = HallucinationGrader::new(llm.clone());
        Self {
            llm,
            retriever,
            gate,
            grader,
            search,
            alerts,
            config,
        }
    }

    /// Run one question through the pipeline to a terminal outcome.
    ///
    /// Each invocation owns a fresh `PipelineState`; concurrent calls
    /// share only the injected clients, which are stateless per call.
    pub async fn run(&self, question: &str) -> crate::errors::Result<PipelineOutcome> {
        let mut state = PipelineState::new(question);
        let mut stage = PipelineStage::Rewrite;
        state.visit(stage);

        // REWRITE: chat-style input passes through verbatim (prompt
        // contract); on LLM failure the raw question is kept as-is.
        match self
            .llm
            .complete(Prompts::SYSTEM_REWRITE, &state.original_question, 0.0)
            .await
        {
            Ok(rewritten) if !rewritten.trim().is_empty() => {
                state.question = rewritten.trim().to_string();
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "rewrite failed, keeping original question");
            }
        }
        info!(
            original = %state.original_question,
            optimized = %state.question,
            "rewrite complete"
        );
        stage = self.advance(&mut state, stage, StageEvent::RewriteComplete)?;

        // ROUTE: classifier failure defaults to the knowledge route —
        // better to do retrieval work than to silently drop a real
        // support request.
        let route = match self
            .llm
            .classify(Prompts::SYSTEM_ROUTER, &state.question)
            .await
        {
            Ok(verdict) if verdict.label == "chat" => Route::Chat,
            Ok(_) => Route::Knowledge,
            Err(e) => {
                warn!(error = %e, "router failed, defaulting to knowledge route");
                Route::Knowledge
            }
        };
        state.route = Some(route);
        info!(?route, "route decided");

        let answer = match route {
            Route::Chat => {
                stage = self.advance(&mut state, stage, StageEvent::RoutedChat)?;
                self.answer_chat(&mut state, &mut stage).await?
            }
            Route::Knowledge => {
                stage = self.advance(&mut state, stage, StageEvent::RoutedKnowledge)?;
                self.answer_knowledge(&mut state, &mut stage).await?
            }
        };

        debug_assert!(stage.is_terminal());
        state.answer = Some(answer.clone());
        Ok(PipelineOutcome { answer, state })
    }

    /// Knowledge route: retrieve, gate, generate, grade, and fall back
    /// to web search on a failed gate or an ungrounded answer.
    async fn answer_knowledge(
        &self,
        state: &mut PipelineState,
        stage: &mut PipelineStage,
    ) -> crate::errors::Result<GeneratedAnswer> {
        state.documents = self.retriever.retrieve(&state.question).await;
        *stage = self.advance(state, *stage, StageEvent::Retrieved)?;

        let decision = self.gate.evaluate(&state.documents);
        state.gate = Some(decision);
        info!(
            passed = decision.passed,
            top1 = decision.top1,
            top2 = decision.top2,
            margin = decision.margin,
            "gate decision"
        );

        if !decision.passed {
            *stage = self.advance(state, *stage, StageEvent::GateFailed)?;
            return self.answer_from_search(state, stage).await;
        }

        *stage = self.advance(state, *stage, StageEvent::GatePassed)?;

        let user = Prompts::rag_user(&state.documents, &state.question);
        let text = match self
            .llm
            .complete(Prompts::SYSTEM_RAG, &user, self.config.answer_temperature)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "knowledge-base generation failed, falling back to search");
                self.alerts
                    .alert("Generation", &e.to_string(), &state.question);
                *stage = self.advance(state, *stage, StageEvent::GenerationFailed)?;
                return self.answer_from_search(state, stage).await;
            }
        };

        let answer = GeneratedAnswer {
            text,
            grounding: Grounding::Knowledge {
                document_ids: state.documents.iter().map(|d| d.id.clone()).collect(),
            },
        };
        *stage = self.advance(state, *stage, StageEvent::AnswerGenerated)?;

        let verdict = self.grader.grade(&answer.text, &state.documents).await;
        state.grade = Some(verdict);

        match verdict {
            GradeVerdict::Grounded => {
                *stage = self.advance(state, *stage, StageEvent::GradedGrounded)?;
                Ok(answer)
            }
            GradeVerdict::Ungrounded => {
                // Single fallback: the answer is discarded and replaced
                // by a search-backed one. The state machine has no edge
                // back into retrieval.
                *stage = self.advance(state, *stage, StageEvent::GradedUngrounded)?;
                self.answer_from_search(state, stage).await
            }
        }
    }

    /// Web-search fallback. Search failure degrades to an explicit
    /// unavailability notice rather than an error.
    async fn answer_from_search(
        &self,
        state: &mut PipelineState,
        stage: &mut PipelineStage,
    ) -> crate::errors::Result<GeneratedAnswer> {
        let hits = match self
            .search
            .search(&state.question, self.config.search_results)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "web search unavailable");
                self.alerts.alert("Search", &e.to_string(), &state.question);
                *stage = self.advance(state, *stage, StageEvent::SearchFailed)?;
                return Ok(GeneratedAnswer {
                    text: MSG_SEARCH_UNAVAILABLE.to_string(),
                    grounding: Grounding::Degraded,
                });
            }
        };

        info!(hits = hits.len(), "web search complete");
        *stage = self.advance(state, *stage, StageEvent::SearchComplete)?;

        let user = Prompts::search_user(&hits, &state.question);
        match self
            .llm
            .complete(Prompts::SYSTEM_SEARCH, &user, self.config.answer_temperature)
            .await
        {
            Ok(text) => {
                *stage = self.advance(state, *stage, StageEvent::AnswerGenerated)?;
                Ok(GeneratedAnswer {
                    text,
                    grounding: Grounding::Search { hits },
                })
            }
            Err(e) => {
                warn!(error = %e, "search-backed generation failed");
                self.alerts
                    .alert("Generation", &e.to_string(), &state.question);
                *stage = self.advance(state, *stage, StageEvent::GenerationFailed)?;
                Ok(GeneratedAnswer {
                    text: MSG_SEARCH_UNAVAILABLE.to_string(),
                    grounding: Grounding::Degraded,
                })
            }
        }
    }

    /// Casual chat route: one short completion, no retrieval.
    async fn answer_chat(
        &self,
        state: &mut PipelineState,
        stage: &mut PipelineStage,
    ) -> crate::errors::Result<GeneratedAnswer> {
        match self
            .llm
            .complete(
                Prompts::SYSTEM_CHAT,
                &state.question,
                self.config.chat_temperature,
            )
            .await
        {
            Ok(text) => {
                *stage = self.advance(state, *stage, StageEvent::AnswerGenerated)?;
                Ok(GeneratedAnswer {
                    text,
                    grounding: Grounding::Chat,
                })
            }
            Err(e) => {
                warn!(error = %e, "chat generation failed");
                self.alerts
                    .alert("Generation", &e.to_string(), &state.question);
                *stage = self.advance(state, *stage, StageEvent::GenerationFailed)?;
                Ok(GeneratedAnswer {
                    text: MSG_ASSISTANT_UNAVAILABLE.to_string(),
                    grounding: Grounding::Degraded,
                })
            }
        }
    }

    /// Transition the state machine and record the new stage in the trace
    fn advance(
        &self,
        state: &mut PipelineState,
        stage: PipelineStage,
        event: StageEvent,
    ) -> crate::errors::Result<PipelineStage> {
        let next = stage.transition(event)?;
        info!(from = ?stage, to = ?next, "stage transition");
        state.visit(next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{Classification, DocumentIndex, EmbeddingProvider, SearchHit};
    use crate::config::GateConfig;
    use crate::errors::{AgentError, Result};
    use crate::retrieval::sparse::Bm25Artifact;
    use crate::retrieval::{Document, Provenance, SparseEncoder, SparseVector};
    use crate::scoring::{RerankScorer, ScoringGateway};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted LLM: echoes rewrites, answers by prompt kind, and
    /// returns a fixed route/grade label.
    struct ScriptedLlm {
        route_label: &'static str,
        grade_label: &'static str,
        completions: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(route_label: &'static str, grade_label: &'static str) -> Self {
            Self {
                route_label,
                grade_label,
                completions: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedLlm {
        async fn complete(&self, system: &str, user: &str, _t: f32) -> Result<String> {
            self.completions.fetch_add(1, Ordering::SeqCst);
            if system == Prompts::SYSTEM_REWRITE {
                Ok(user.to_string())
            } else if system == Prompts::SYSTEM_RAG {
                Ok("kb answer".to_string())
            } else if system == Prompts::SYSTEM_SEARCH {
                Ok("search answer".to_string())
            } else {
                Ok("chat answer".to_string())
            }
        }

        async fn classify(&self, system: &str, _user: &str) -> Result<Classification> {
            let label = if system == Prompts::SYSTEM_ROUTER {
                self.route_label
            } else {
                self.grade_label
            };
            Ok(Classification {
                label: label.to_string(),
                reason: String::new(),
            })
        }
    }

    struct OkEmbedder;

    #[async_trait]
    impl EmbeddingProvider for OkEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 4])
        }
    }

    struct StaticIndex {
        docs: Vec<Document>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentIndex for StaticIndex {
        async fn query(
            &self,
            _dense: &[f32],
            _sparse: &SparseVector,
            _top_k: usize,
        ) -> Result<Vec<Document>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.docs.clone())
        }
    }

    /// Scores every candidate with a fixed logit sequence
    struct FixedScorer(Vec<f32>);

    #[async_trait]
    impl RerankScorer for FixedScorer {
        async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>> {
            Ok(self.0.iter().cycle().take(texts.len()).copied().collect())
        }
    }

    struct OkSearch(AtomicUsize);

    #[async_trait]
    impl WebSearchProvider for OkSearch {
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![SearchHit {
                title: "t".to_string(),
                url: "u".to_string(),
                snippet: "s".to_string(),
            }])
        }
    }

    struct FailingSearch;

    #[async_trait]
    impl WebSearchProvider for FailingSearch {
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>> {
            Err(AgentError::SearchError("quota exceeded".to_string()))
        }
    }

    struct NoAlerts;

    impl AlertSink for NoAlerts {
        fn alert(&self, _m: &str, _e: &str, _d: &str) {}
    }

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            title: format!("scenario {}", id),
            steps: "steps".to_string(),
            score: 1.0,
            provenance: Provenance::Coarse,
        }
    }

    fn build_pipeline(
        llm: Arc<ScriptedLlm>,
        index: Arc<StaticIndex>,
        scorer: Arc<FixedScorer>,
        search: Arc<dyn WebSearchProvider>,
    ) -> Pipeline {
        let gateway = Arc::new(ScoringGateway::new(
            Arc::new(OkEmbedder),
            scorer,
            Arc::new(NoAlerts),
        ));
        let sparse = SparseEncoder::from_artifact(Bm25Artifact {
            n_docs: 1,
            vocab: HashMap::new(),
        });
        let retriever = Arc::new(TwoStageRetriever::new(
            gateway,
            index,
            sparse,
            Arc::new(NoAlerts),
            2,
        ));

        Pipeline::new(
            llm,
            retriever,
            RetrievalGate::new(GateConfig::default()),
            search,
            Arc::new(NoAlerts),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_chat_route_skips_retrieval() {
        let llm = Arc::new(ScriptedLlm::new("chat", "yes"));
        let index = Arc::new(StaticIndex {
            docs: vec![doc("1")],
            calls: AtomicUsize::new(0),
        });
        let pipeline = build_pipeline(
            llm,
            index.clone(),
            Arc::new(FixedScorer(vec![2.0])),
            Arc::new(OkSearch(AtomicUsize::new(0))),
        );

        let outcome = pipeline.run("你好").await.unwrap();
        assert_eq!(outcome.answer.text, "chat answer");
        assert!(matches!(outcome.answer.grounding, Grounding::Chat));
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
        assert!(!outcome.state.visited(PipelineStage::Retrieve));
        assert!(outcome.state.visited(PipelineStage::GenerateChat));
    }

    #[tokio::test]
    async fn test_grounded_knowledge_answer() {
        let llm = Arc::new(ScriptedLlm::new("rag", "yes"));
        let index = Arc::new(StaticIndex {
            docs: vec![doc("1"), doc("2")],
            calls: AtomicUsize::new(0),
        });
        // Logits 2.0 / -2.0 give a decisive margin after sigmoid.
        let pipeline = build_pipeline(
            llm,
            index,
            Arc::new(FixedScorer(vec![2.0, -2.0])),
            Arc::new(OkSearch(AtomicUsize::new(0))),
        );

        let outcome = pipeline.run("vpn failure").await.unwrap();
        assert_eq!(outcome.answer.text, "kb answer");
        assert!(outcome.state.gate.unwrap().passed);
        assert_eq!(outcome.state.grade, Some(GradeVerdict::Grounded));
        assert!(outcome.state.visited(PipelineStage::Done));
        assert!(!outcome.state.visited(PipelineStage::WebSearch));
    }

    #[tokio::test]
    async fn test_ungrounded_falls_back_to_search_once() {
        let llm = Arc::new(ScriptedLlm::new("rag", "no"));
        let index = Arc::new(StaticIndex {
            docs: vec![doc("1"), doc("2")],
            calls: AtomicUsize::new(0),
        });
        let search = Arc::new(OkSearch(AtomicUsize::new(0)));
        let pipeline = build_pipeline(
            llm,
            index.clone(),
            Arc::new(FixedScorer(vec![2.0, -2.0])),
            search.clone(),
        );

        let outcome = pipeline.run("vpn failure").await.unwrap();
        assert_eq!(outcome.answer.text, "search answer");
        assert!(matches!(outcome.answer.grounding, Grounding::Search { .. }));
        // Retrieval ran once; the fallback used search, not a re-query.
        assert_eq!(index.calls.load(Ordering::SeqCst), 1);
        assert_eq!(search.0.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome
                .state
                .trace
                .iter()
                .filter(|s| **s == PipelineStage::Retrieve)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_empty_retrieval_goes_to_search_without_generation() {
        let llm = Arc::new(ScriptedLlm::new("rag", "yes"));
        let index = Arc::new(StaticIndex {
            docs: Vec::new(),
            calls: AtomicUsize::new(0),
        });
        let pipeline = build_pipeline(
            llm.clone(),
            index,
            Arc::new(FixedScorer(vec![2.0])),
            Arc::new(OkSearch(AtomicUsize::new(0))),
        );

        let outcome = pipeline.run("vpn failure").await.unwrap();
        assert_eq!(outcome.answer.text, "search answer");
        assert!(!outcome.state.gate.unwrap().passed);
        assert!(!outcome.state.visited(PipelineStage::GenerateRag));
        assert!(!outcome.state.visited(PipelineStage::Grade));
        assert!(outcome.state.visited(PipelineStage::WebSearch));
    }

    #[tokio::test]
    async fn test_search_failure_degrades_honestly() {
        let llm = Arc::new(ScriptedLlm::new("rag", "yes"));
        let index = Arc::new(StaticIndex {
            docs: Vec::new(),
            calls: AtomicUsize::new(0),
        });
        let pipeline = build_pipeline(
            llm,
            index,
            Arc::new(FixedScorer(vec![2.0])),
            Arc::new(FailingSearch),
        );

        let outcome = pipeline.run("vpn failure").await.unwrap();
        assert!(outcome.answer.text.contains("unavailable"));
        assert!(matches!(outcome.answer.grounding, Grounding::Degraded));
        assert!(outcome.state.visited(PipelineStage::Done));
    }
}
