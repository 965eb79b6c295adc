//! Candidate knowledge-base entries as they move through retrieval

use serde::{Deserialize, Serialize};

/// Which scoring stage last set a document's score.
///
/// Scores are only comparable between documents carrying the same
/// provenance: coarse recall scores are un-normalized similarity values,
/// rerank scores are sigmoid-normalized into (0,1). `Degraded` marks
/// coarse scores that were passed through because reranking failed, which
/// downstream gating treats conservatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Coarse,
    Reranked,
    Degraded,
}

/// One candidate knowledge-base entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier in the index
    pub id: String,
    /// Fault-scenario title
    pub title: String,
    /// Remediation steps
    pub steps: String,
    /// Relevance score, meaningful only within `provenance`'s stage
    pub score: f32,
    pub provenance: Provenance,
}

impl Document {
    /// Concatenated content the cross-encoder scores the query against
    pub fn rerank_text(&self) -> String {
        format!("Scenario: {}\nSteps: {}", self.title, self.steps)
    }

    /// Block rendered into the generation prompt's knowledge section
    pub fn context_block(&self) -> String {
        format!("[Fault scenario] {}\n[Remediation steps] {}", self.title, self.steps)
    }
}

/// Ordered document sequence produced once per query. Rank order is
/// significant; duplicates by id are not de-duplicated at this layer.
pub type RetrievalResult = Vec<Document>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rerank_text_includes_title_and_steps() {
        let doc = Document {
            id: "kb-17".to_string(),
            title: "VPN connection failure".to_string(),
            steps: "1. Reset the adapter\n2. Re-enroll the certificate".to_string(),
            score: 0.0,
            provenance: Provenance::Coarse,
        };

        let text = doc.rerank_text();
        assert!(text.contains("VPN connection failure"));
        assert!(text.contains("Reset the adapter"));
    }

    #[test]
    fn test_provenance_roundtrip() {
        let json = serde_json::to_string(&Provenance::Degraded).unwrap();
        let back: Provenance = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Provenance::Degraded);
    }
}
