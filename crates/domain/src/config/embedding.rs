use serde::{Deserialize, Serialize};

fn d_model() -> String {
    "Qwen/Qwen3-Embedding-8B".to_string()
}
fn d_device() -> String {
    "cpu".to_string()
}
fn d_base_url() -> String {
    "https://api.siliconflow.cn/v1".to_string()
}
fn d_chunk_size() -> usize {
    8000
}
fn d_timeout_secs() -> u64 {
    30
}

/// Embedding client defaults (§6.6 `EMBEDDING_MODEL`/`EMBEDDING_DEVICE`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_device")]
    pub device: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "d_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: d_model(),
            device: d_device(),
            base_url: d_base_url(),
            api_key: String::new(),
            chunk_size: d_chunk_size(),
            timeout_secs: d_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
            cfg.model = v;
        }
        if let Ok(v) = std::env::var("EMBEDDING_DEVICE") {
            cfg.device = v;
        }
        if let Ok(v) = std::env::var("SILICONFLOW_API_KEY") {
            cfg.api_key = v;
        }
        cfg
    }
}

fn d_generator_model() -> String {
    "Tongyi-Zhiwen/QwenLong-L1-32B".to_string()
}

/// Generator (summarizer) client defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "d_generator_model")]
    pub model: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: d_generator_model(),
            base_url: d_base_url(),
            api_key: String::new(),
            timeout_secs: d_timeout_secs(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("SILICONFLOW_API_KEY") {
            cfg.api_key = v;
        }
        cfg
    }
}
