//! Retrieval quality gate
//!
//! Pure decision function over the ranked, rerank-normalized scores.
//! Deterministic for identical inputs; the orchestrator owns logging and
//! branching on the verdict.

use crate::config::GateConfig;
use crate::retrieval::{Document, Provenance};
use serde::{Deserialize, Serialize};

/// Gate verdict plus the scores it was based on, kept for the trace
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateDecision {
    pub passed: bool,
    pub top1: f32,
    pub top2: f32,
    pub margin: f32,
}

/// Pass/fail gate over a retrieval result
#[derive(Debug, Clone, Copy)]
pub struct RetrievalGate {
    thresholds: GateConfig,
}

impl RetrievalGate {
    pub fn new(thresholds: GateConfig) -> Self {
        Self { thresholds }
    }

    /// Evaluate the five rules in strict priority order:
    ///
    /// 1. empty result fails;
    /// 2. top-1 below the score floor fails;
    /// 3. top-1 at or above high confidence passes, overriding margin —
    ///    unless the result is degraded (un-normalized coarse scores must
    ///    never claim high confidence);
    /// 4. margin below the margin floor fails as ambiguous;
    /// 5. otherwise pass.
    pub fn evaluate(&self, documents: &[Document]) -> GateDecision {
        let Some(first) = documents.first() else {
            return GateDecision {
                passed: false,
                top1: 0.0,
                top2: 0.0,
                margin: 0.0,
            };
        };

        let top1 = first.score;
        let top2 = documents.get(1).map(|d| d.score).unwrap_or(0.0);
        let margin = top1 - top2;
        let degraded = first.provenance == Provenance::Degraded;

        let passed = if top1 < self.thresholds.score_floor {
            false
        } else if !degraded && top1 >= self.thresholds.high_confidence {
            true
        } else if margin < self.thresholds.margin_floor {
            false
        } else {
            true
        };

        GateDecision {
            passed,
            top1,
            top2,
            margin,
        }
    }
}
