//! Cross-encoder relevance scoring via Candle
//!
//! Scores query/document pairs with a BERT-style sequence classification
//! model and returns raw relevance logits; sigmoid normalization is the
//! gateway's job so the model adapter stays an opaque scoring function.

use crate::errors::{AgentError, Result};
use anyhow::Context;
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Pairwise relevance scoring interface
#[async_trait]
pub trait RerankScorer: Send + Sync {
    /// Score the query against each text, returning one raw logit per
    /// text in input order.
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>>;
}

/// BERT cross-encoder loaded from the HuggingFace hub
pub struct BertCrossEncoder {
    model: Arc<BertModel>,
    classifier: Linear,
    tokenizer: Arc<Tokenizer>,
    device: Device,
}

impl BertCrossEncoder {
    /// Load model and tokenizer (downloads on first use)
    pub fn new(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo.get("config.json")
            .context("Failed to download model config")?;
        let tokenizer_path = repo.get("tokenizer.json")
            .context("Failed to download tokenizer")?;
        let weights_path = repo.get("model.safetensors")
            .context("Failed to download model weights")?;

        let config_contents = std::fs::read_to_string(config_path)
            .context("Failed to read config file")?;
        let config: Config = serde_json::from_str(&config_contents)
            .context("Failed to parse model config")?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| AgentError::RerankError(format!("Failed to load tokenizer: {}", e)))?;
        if let Some(truncation) = tokenizer.get_truncation_mut() {
            truncation.max_length = 512;
        }

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(
                &[weights_path],
                candle_core::DType::F32,
                &device,
            ).context("Failed to load model weights")?
        };

        let classifier = candle_nn::linear(config.hidden_size, 1, vb.pp("classifier"))
            .context("Failed to load classification head")?;

        let model = BertModel::load(vb, &config)
            .context("Failed to create BERT model")?;

        Ok(Self {
            model: Arc::new(model),
            classifier,
            tokenizer: Arc::new(tokenizer),
            device,
        })
    }

    fn score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(String, String)> = texts
            .iter()
            .map(|text| (query.to_string(), text.clone()))
            .collect();

        let encodings = self.tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| AgentError::RerankError(format!("Tokenization failed: {}", e)))?;

        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        // Pad sequences
        let mut padded_ids = vec![vec![0u32; max_len]; batch_size];
        let mut padded_types = vec![vec![0u32; max_len]; batch_size];
        let mut padded_mask = vec![vec![0u32; max_len]; batch_size];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            padded_ids[i][..ids.len()].copy_from_slice(ids);
            let types = encoding.get_type_ids();
            padded_types[i][..types.len()].copy_from_slice(types);
            let mask = encoding.get_attention_mask();
            padded_mask[i][..mask.len()].copy_from_slice(mask);
        }

        let flat_ids: Vec<u32> = padded_ids.into_iter().flatten().collect();
        let flat_types: Vec<u32> = padded_types.into_iter().flatten().collect();
        let flat_mask: Vec<u32> = padded_mask.into_iter().flatten().collect();

        let token_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &self.device)
            .map_err(anyhow::Error::from)?;
        let token_types = Tensor::from_vec(flat_types, (batch_size, max_len), &self.device)
            .map_err(anyhow::Error::from)?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &self.device)
            .map_err(anyhow::Error::from)?;

        let hidden = self
            .model
            .forward(&token_ids, &token_types, Some(&attention_mask))
            .map_err(anyhow::Error::from)?;

        // Classification head over the [CLS] position
        let cls = hidden.narrow(1, 0, 1).map_err(anyhow::Error::from)?
            .squeeze(1).map_err(anyhow::Error::from)?;
        let logits = self.classifier.forward(&cls).map_err(anyhow::Error::from)?;
        let logits = logits.squeeze(1).map_err(anyhow::Error::from)?;

        let scores = logits.to_vec1::<f32>().map_err(anyhow::Error::from)?;
        Ok(scores)
    }
}

#[async_trait]
impl RerankScorer for BertCrossEncoder {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        self.score_batch(query, texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore]  // Integration test - requires model download
    async fn test_score_orders_relevance() {
        let encoder = BertCrossEncoder::new("BAAI/bge-reranker-base").unwrap();
        let texts = vec![
            "Scenario: VPN connection failure\nSteps: reset adapter".to_string(),
            "Scenario: cafeteria menu\nSteps: check the intranet".to_string(),
        ];
        let scores = encoder.score("vpn won't connect", &texts).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0] > scores[1]);
    }

    #[tokio::test]
    #[ignore]  // Integration test - requires model download
    async fn test_score_empty_input() {
        let encoder = BertCrossEncoder::new("BAAI/bge-reranker-base").unwrap();
        let scores = encoder.score("anything", &[]).await.unwrap();
        assert!(scores.is_empty());
    }
}
