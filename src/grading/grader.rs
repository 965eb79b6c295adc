//! Hallucination grading
//!
//! Classifies a generated answer as grounded or ungrounded against its
//! source documents. Failure policy: any classifier failure or malformed
//! verdict counts as `Grounded`. That is a deliberate
//! availability-over-precision tradeoff — a grader outage must not send
//! every answer into the web-search fallback, and an ungrounded verdict
//! already gets only one fallback attempt.

use crate::clients::CompletionProvider;
use crate::pipeline::prompts::Prompts;
use crate::retrieval::Document;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Grading outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradeVerdict {
    Grounded,
    Ungrounded,
}

/// Grades generated answers against their source documents
pub struct HallucinationGrader {
    llm: Arc<dyn CompletionProvider>,
}

impl HallucinationGrader {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    /// Grade an answer. Fails open to `Grounded` on any upstream or
    /// parse failure.
    pub async fn grade(&self, answer: &str, documents: &[Document]) -> GradeVerdict {
        let context: Vec<String> = documents.iter().map(|d| d.steps.clone()).collect();
        let user = format!(
            "[Reference documents]\n{}\n\n[Generated answer]\n{}",
            context.join("\n"),
            answer
        );

        match self.llm.classify(Prompts::SYSTEM_GRADER, &user).await {
            Ok(verdict) => {
                let grounded = verdict.label == "yes";
                info!(
                    grounded,
                    reason = %verdict.reason,
                    "grader verdict"
                );
                if grounded {
                    GradeVerdict::Grounded
                } else {
                    GradeVerdict::Ungrounded
                }
            }
            Err(e) => {
                warn!(error = %e, "grader unavailable, failing open to grounded");
                GradeVerdict::Grounded
            }
        }
    }
}
