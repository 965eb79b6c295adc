//! Two-stage retriever: coarse hybrid recall, then cross-encoder rerank
//!
//! Stage one casts a wide net (dense + sparse, 10x the final count) to
//! maximize recall; stage two pays the cross-encoder cost only on that
//! candidate set. Every failure mode maps to an empty result, which the
//! gate turns into the web-search fallback.

use crate::clients::{AlertSink, DocumentIndex};
use crate::retrieval::{RetrievalResult, SparseEncoder};
use crate::scoring::ScoringGateway;
use std::sync::Arc;
use tracing::{debug, warn};

/// Coarse recall fans out this many times the final top-k, with a floor
/// so small top-k values still get a meaningful candidate pool.
const COARSE_FANOUT: usize = 10;
const COARSE_MIN: usize = 50;

/// Two-stage retrieval over the knowledge-base index
pub struct TwoStageRetriever {
    gateway: Arc<ScoringGateway>,
    index: Arc<dyn DocumentIndex>,
    sparse: SparseEncoder,
    alerts: Arc<dyn AlertSink>,
    top_k: usize,
}

impl TwoStageRetriever {
    pub fn new(
        gateway: Arc<ScoringGateway>,
        index: Arc<dyn DocumentIndex>,
        sparse: SparseEncoder,
        alerts: Arc<dyn AlertSink>,
        top_k: usize,
    ) -> Self {
        Self {
            gateway,
            index,
            sparse,
            alerts,
            top_k,
        }
    }

    /// Retrieve the top-k quality-ranked documents for a query.
    ///
    /// An empty result is the recoverable quality-fail signal: embedding
    /// failure, index failure, and zero coarse candidates all land here
    /// and route the pipeline to the web-search fallback.
    pub async fn retrieve(&self, query: &str) -> RetrievalResult {
        let Some(dense) = self.gateway.embed(query).await else {
            return Vec::new();
        };

        let sparse = self.sparse.encode_query(query);
        let coarse_k = (self.top_k * COARSE_FANOUT).max(COARSE_MIN);

        let coarse = match self.index.query(&dense, &sparse, coarse_k).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "index query failed, degrading to web search");
                self.alerts
                    .alert("Index", &e.to_string(), &format!("Query: {:.100}", query));
                return Vec::new();
            }
        };

        if coarse.is_empty() {
            debug!("coarse recall returned no candidates");
            return Vec::new();
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            for (rank, doc) in coarse.iter().take(10).enumerate() {
                debug!(
                    rank = rank + 1,
                    id = %doc.id,
                    title = %doc.title,
                    raw_score = doc.score,
                    "coarse candidate"
                );
            }
        }

        self.gateway.rerank(query, coarse, self.top_k).await
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}
