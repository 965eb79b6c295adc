//! Sparse lexical query encoding
//!
//! Weights query terms by inverse document frequency from a BM25
//! vocabulary previously fit on the knowledge-base corpus and persisted
//! as a JSON artifact. Only query encoding lives here; document-side
//! encoding (where the BM25 tf saturation parameters apply) happens at
//! indexing time, outside this crate.

use crate::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Sparse lexical representation of a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Fitted BM25 vocabulary entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermStats {
    pub index: u32,
    pub doc_freq: u32,
}

/// Persisted BM25 model artifact.
///
/// Only the fields the query side needs. The fitting pipeline also
/// persists document-side parameters (k1, b, average document length);
/// those apply at indexing time and are ignored here, so artifacts
/// carrying them still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Artifact {
    pub n_docs: u32,
    pub vocab: HashMap<String, TermStats>,
}

/// Query-side BM25 encoder over a fitted artifact
#[derive(Debug, Clone)]
pub struct SparseEncoder {
    artifact: Bm25Artifact,
}

impl SparseEncoder {
    /// Load a fitted artifact from disk
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read BM25 artifact {}: {}",
                path.display(),
                e
            ))
        })?;

        let artifact: Bm25Artifact = serde_json::from_str(&contents).map_err(|e| {
            AgentError::ConfigError(format!("Failed to parse BM25 artifact: {}", e))
        })?;

        Ok(Self { artifact })
    }

    pub fn from_artifact(artifact: Bm25Artifact) -> Self {
        Self { artifact }
    }

    /// Encode a query: tokenize, weight known terms by inverse document
    /// frequency, normalize weights to sum to one. Unknown terms are
    /// skipped, so the vector can come back empty for chat-style input.
    pub fn encode_query(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);

        let mut weights: HashMap<u32, f32> = HashMap::new();
        for token in tokens {
            if let Some(stats) = self.artifact.vocab.get(&token) {
                let idf = self.idf(stats.doc_freq);
                *weights.entry(stats.index).or_insert(0.0) += idf;
            }
        }

        let total: f32 = weights.values().sum();
        if total <= 0.0 {
            return SparseVector::default();
        }

        let mut pairs: Vec<(u32, f32)> = weights
            .into_iter()
            .map(|(index, weight)| (index, weight / total))
            .collect();
        pairs.sort_by_key(|(index, _)| *index);

        SparseVector {
            indices: pairs.iter().map(|(i, _)| *i).collect(),
            values: pairs.iter().map(|(_, v)| *v).collect(),
        }
    }

    fn idf(&self, doc_freq: u32) -> f32 {
        let n = self.artifact.n_docs as f32;
        let df = doc_freq as f32;
        (((n - df + 0.5) / (df + 0.5)) + 1.0).ln()
    }
}

/// Tokenizer matching how the corpus-side artifact was fit: lowercase
/// alphanumeric runs for alphabetic text, character bigrams for CJK.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    let mut flush_word = |word: &mut String, tokens: &mut Vec<String>| {
        if !word.is_empty() {
            tokens.push(std::mem::take(word));
        }
    };

    let flush_cjk = |run: &mut Vec<char>, tokens: &mut Vec<String>| {
        match run.len() {
            0 => {}
            1 => tokens.push(run[0].to_string()),
            _ => {
                for pair in run.windows(2) {
                    tokens.push(pair.iter().collect());
                }
            }
        }
        run.clear();
    };

    for c in text.chars() {
        if is_cjk(c) {
            flush_word(&mut word, &mut tokens);
            cjk_run.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut tokens);
            word.extend(c.to_lowercase());
        } else {
            flush_word(&mut word, &mut tokens);
            flush_cjk(&mut cjk_run, &mut tokens);
        }
    }
    flush_word(&mut word, &mut tokens);
    flush_cjk(&mut cjk_run, &mut tokens);

    tokens
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}
