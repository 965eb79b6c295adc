//! Qdrant document index adapter
//!
//! Issues the coarse-recall query: dense similarity plus sparse lexical
//! scoring over named vectors, fused client-side with reciprocal-rank
//! fusion. Fused scores are un-normalized coarse-stage values used only
//! for candidate selection.

use crate::errors::{AgentError, Result};
use crate::retrieval::{Document, Provenance, SparseVector};
use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        with_payload_selector::SelectorOptions, ScoredPoint, SearchPoints, SparseIndices,
        Value as QdrantValue, WithPayloadSelector,
    },
};
use std::collections::HashMap;

/// Rank constant for reciprocal-rank fusion
const RRF_K: f32 = 60.0;

/// Document index interface consumed by the retriever
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Combined dense+sparse query returning `top_k` coarse candidates
    /// in rank order.
    async fn query(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        top_k: usize,
    ) -> Result<Vec<Document>>;
}

/// Qdrant-backed index over a collection with named `dense` and `sparse`
/// vectors and `name`/`steps` payload fields.
pub struct QdrantIndex {
    client: QdrantClient,
    collection: String,
}

impl QdrantIndex {
    pub fn new(url: &str, collection: &str) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| AgentError::IndexError(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }

    async fn search_leg(
        &self,
        vector: Vec<f32>,
        vector_name: &str,
        sparse_indices: Option<SparseIndices>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector,
                vector_name: Some(vector_name.to_string()),
                sparse_indices,
                limit: limit as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| AgentError::IndexError(format!("Search failed: {}", e)))?;

        Ok(result.result)
    }
}

#[async_trait]
impl DocumentIndex for QdrantIndex {
    async fn query(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        top_k: usize,
    ) -> Result<Vec<Document>> {
        let dense_hits = self
            .search_leg(dense.to_vec(), "dense", None, top_k)
            .await?;

        let sparse_hits = if sparse.is_empty() {
            Vec::new()
        } else {
            self.search_leg(
                sparse.values.clone(),
                "sparse",
                Some(SparseIndices {
                    data: sparse.indices.clone(),
                }),
                top_k,
            )
            .await?
        };

        Ok(fuse_hits(dense_hits, sparse_hits, top_k))
    }
}

/// Reciprocal-rank fusion of the two search legs. A document found by
/// both legs accumulates both rank contributions.
fn fuse_hits(dense: Vec<ScoredPoint>, sparse: Vec<ScoredPoint>, top_k: usize) -> Vec<Document> {
    let mut fused: HashMap<String, (f32, Document)> = HashMap::new();

    for hits in [dense, sparse] {
        for (rank, point) in hits.into_iter().enumerate() {
            let doc = point_to_document(point);
            let contribution = 1.0 / (RRF_K + rank as f32 + 1.0);

            fused
                .entry(doc.id.clone())
                .and_modify(|(score, _)| *score += contribution)
                .or_insert((contribution, doc));
        }
    }

    let mut documents: Vec<Document> = fused
        .into_values()
        .map(|(score, mut doc)| {
            doc.score = score;
            doc
        })
        .collect();

    documents.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    documents.truncate(top_k);
    documents
}

fn point_to_document(point: ScoredPoint) -> Document {
    let title = point
        .payload
        .get("name")
        .and_then(qdrant_value_to_string)
        .unwrap_or_default();
    let steps = point
        .payload
        .get("steps")
        .and_then(qdrant_value_to_string)
        .unwrap_or_default();

    Document {
        id: point_id_to_string(&point.id),
        title,
        steps,
        score: point.score,
        provenance: Provenance::Coarse,
    }
}

fn qdrant_value_to_string(value: &QdrantValue) -> Option<String> {
    value.kind.as_ref().and_then(|kind| {
        use qdrant_client::qdrant::value::Kind;
        match kind {
            Kind::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    })
}

fn point_id_to_string(point_id: &Option<qdrant_client::qdrant::PointId>) -> String {
    point_id
        .as_ref()
        .map(|id| {
            use qdrant_client::qdrant::point_id::PointIdOptions;
            match &id.point_id_options {
                Some(PointIdOptions::Num(n)) => n.to_string(),
                Some(PointIdOptions::Uuid(u)) => u.clone(),
                None => "unknown".to_string(),
            }
        })
        .unwrap_or_else(|| "unknown".to_string())
}
