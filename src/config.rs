use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub gate: GateConfig,
}

/// API credentials. Every field can be overridden by environment
/// variables so secrets never need to live in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialsConfig {
    pub llm_key: Option<String>,
    pub embed_key: Option<String>,
    pub search_key: Option<String>,
    /// Webhook endpoint that receives failure alerts
    pub alert_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Chat model used for answer generation
    pub chat: String,
    /// Smaller/faster model used for rewrite, routing and grading
    pub router: String,
    /// Embedding model identifier
    pub embedding: String,
    /// Cross-encoder model identifier on the HuggingFace hub
    pub reranker: String,
    /// OpenAI-compatible chat completions base URL
    pub llm_base_url: String,
    /// Embedding API base URL
    pub embed_base_url: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            chat: "qwen3-max".to_string(),
            router: "qwen-turbo".to_string(),
            embedding: "text-embedding-004".to_string(),
            reranker: "BAAI/bge-reranker-base".to_string(),
            llm_base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            embed_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Qdrant endpoint
    pub index_url: String,
    /// Collection holding the knowledge-base entries
    pub index_name: String,
    /// Path to the fitted BM25 artifact
    pub bm25_path: PathBuf,
    /// Final document count handed to generation
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_url: "http://localhost:6334".to_string(),
            index_name: "it-knowledge".to_string(),
            bm25_path: PathBuf::from("bm25_model.json"),
            top_k: 3,
        }
    }
}

/// Gate thresholds. Externally configurable because the rerank model's
/// score calibration drifts between model versions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub score_floor: f32,
    pub high_confidence: f32,
    pub margin_floor: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            score_floor: 0.35,
            high_confidence: 0.60,
            margin_floor: 0.03,
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist,
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            toml::from_str(&contents).context("Failed to parse config file")?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(&config_path, toml_string)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Could not determine home directory")?;

        Ok(home.join(".deskbuddy").join("config.toml"))
    }

    /// Environment variables take precedence over file values.
    /// Unparseable numeric overrides keep the current value.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DESKBUDDY_LLM_KEY") {
            self.credentials.llm_key = Some(v);
        }
        if let Ok(v) = std::env::var("DESKBUDDY_EMBED_KEY") {
            self.credentials.embed_key = Some(v);
        }
        if let Ok(v) = std::env::var("DESKBUDDY_SEARCH_KEY") {
            self.credentials.search_key = Some(v);
        }
        if let Ok(v) = std::env::var("DESKBUDDY_ALERT_URL") {
            self.credentials.alert_url = Some(v);
        }
        if let Ok(v) = std::env::var("DESKBUDDY_INDEX_URL") {
            self.retrieval.index_url = v;
        }
        if let Ok(v) = std::env::var("DESKBUDDY_INDEX_NAME") {
            self.retrieval.index_name = v;
        }
        if let Ok(v) = std::env::var("DESKBUDDY_BM25_PATH") {
            self.retrieval.bm25_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DESKBUDDY_TOP_K") {
            if let Ok(n) = v.parse() {
                self.retrieval.top_k = n;
            }
        }
        if let Ok(v) = std::env::var("DESKBUDDY_SCORE_FLOOR") {
            if let Ok(f) = v.parse() {
                self.gate.score_floor = f;
            }
        }
        if let Ok(v) = std::env::var("DESKBUDDY_HIGH_CONFIDENCE") {
            if let Ok(f) = v.parse() {
                self.gate.high_confidence = f;
            }
        }
        if let Ok(v) = std::env::var("DESKBUDDY_MARGIN_FLOOR") {
            if let Ok(f) = v.parse() {
                self.gate.margin_floor = f;
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            credentials: CredentialsConfig::default(),
            models: ModelsConfig::default(),
            retrieval: RetrievalConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_thresholds() {
        let config = Config::default();
        assert_eq!(config.gate.score_floor, 0.35);
        assert_eq!(config.gate.high_confidence, 0.60);
        assert_eq!(config.gate.margin_floor, 0.03);
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.retrieval.index_name = "test-index".to_string();

        let toml_string = toml::to_string(&config).unwrap();
        assert!(toml_string.contains("test-index"));

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(deserialized.retrieval.index_name, "test-index");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        // A section may set a subset of its fields; the rest default.
        let config: Config = toml::from_str("[gate]\nscore_floor = 0.5\n").unwrap();
        assert_eq!(config.gate.score_floor, 0.5);
        assert_eq!(config.gate.high_confidence, 0.60);
        assert_eq!(config.models.router, "qwen-turbo");

        let config: Config =
            toml::from_str("[retrieval]\nindex_name = \"staging\"\n").unwrap();
        assert_eq!(config.retrieval.index_name, "staging");
        assert_eq!(config.retrieval.top_k, 3);

        let config: Config = toml::from_str("[models]\nchat = \"qwen3-plus\"\n").unwrap();
        assert_eq!(config.models.chat, "qwen3-plus");
        assert_eq!(config.models.embedding, "text-embedding-004");
    }
}
