//! Scoring gateway
//!
//! Front door to the two external scoring models. Failures never cross
//! this boundary as errors: embedding failure becomes the
//! abandon-retrieval sentinel, rerank failure becomes a degraded coarse
//! passthrough, and both dispatch a background alert.

use crate::clients::{AlertSink, EmbeddingProvider};
use crate::retrieval::{Document, Provenance};
use crate::scoring::RerankScorer;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Gateway over the embedding model and cross-encoder reranker
pub struct ScoringGateway {
    embedder: Arc<dyn EmbeddingProvider>,
    scorer: Arc<dyn RerankScorer>,
    alerts: Arc<dyn AlertSink>,
}

impl ScoringGateway {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        scorer: Arc<dyn RerankScorer>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            embedder,
            scorer,
            alerts,
        }
    }

    /// Embed a query. `None` means the embedding service failed and the
    /// retrieval route must be abandoned with a quality-fail signal; an
    /// alert is already on its way when that happens.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                error!(error = %e, "embedding failed, abandoning retrieval route");
                self.alerts.alert(
                    "Embedding",
                    &e.to_string(),
                    &format!("Query text: {:.100}", text),
                );
                None
            }
        }
    }

    /// Rerank coarse candidates against the query.
    ///
    /// On success every returned document carries a sigmoid-normalized
    /// score in (0,1) and `Reranked` provenance, sorted descending with
    /// coarse rank as the stable tie-break. On failure the first `top_k`
    /// coarse candidates pass through unmodified except for `Degraded`
    /// provenance, so downstream gating treats them conservatively.
    pub async fn rerank(
        &self,
        query: &str,
        mut documents: Vec<Document>,
        top_k: usize,
    ) -> Vec<Document> {
        if documents.is_empty() {
            return documents;
        }

        let texts: Vec<String> = documents.iter().map(|d| d.rerank_text()).collect();

        match self.scorer.score(query, &texts).await {
            Ok(logits) if logits.len() == documents.len() => {
                for (doc, logit) in documents.iter_mut().zip(logits) {
                    doc.score = sigmoid(logit);
                    doc.provenance = Provenance::Reranked;
                }

                // sort_by is stable: ties keep coarse rank order.
                documents.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                documents.truncate(top_k);

                debug!(
                    top1 = documents.first().map(|d| d.score),
                    count = documents.len(),
                    "rerank complete"
                );
                documents
            }
            Ok(logits) => {
                warn!(
                    expected = documents.len(),
                    got = logits.len(),
                    "rerank returned wrong score count, degrading to coarse order"
                );
                self.alerts.alert(
                    "Rerank",
                    "score count mismatch",
                    &format!("expected {}, got {}", documents.len(), logits.len()),
                );
                degrade(documents, top_k)
            }
            Err(e) => {
                warn!(error = %e, "rerank failed, degrading to coarse order");
                self.alerts
                    .alert("Rerank", &e.to_string(), &format!("Query: {:.100}", query));
                degrade(documents, top_k)
            }
        }
    }
}

fn degrade(mut documents: Vec<Document>, top_k: usize) -> Vec<Document> {
    documents.truncate(top_k);
    for doc in &mut documents {
        doc.provenance = Provenance::Degraded;
    }
    documents
}

/// Monotonic saturating map from an unbounded logit into (0,1)
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
