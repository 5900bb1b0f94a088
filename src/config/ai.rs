// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::openrouter::OPENROUTER_API_URL;

fn default_models() -> Vec<String> {
    [
        "deepseek/deepseek-chat:free",
        "anthropic/claude-3-haiku:free",
        "mistralai/mistral-7b-instruct:free",
        "meta-llama/llama-3-8b-instruct:free",
        "qwen/qwq-32b:free",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_summary_model() -> String {
    "deepseek/deepseek-chat:free".to_string()
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_api_url() -> String {
    OPENROUTER_API_URL.to_string()
}

/// Annotation pipeline config, loaded from `config/ai.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Model ids queried for every analysis. Must not be empty.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    /// How many of `models` to sample per analysis; absent means all of them.
    #[serde(default)]
    pub models_per_analysis: Option<usize>,
    /// Single model used for the narrative summary.
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
    /// Cooldown imposed on a rate-limited key.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Chat-completions endpoint; overridable for tests/self-hosted proxies.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            models_per_analysis: None,
            summary_model: default_summary_model(),
            cooldown_secs: default_cooldown_secs(),
            api_url: default_api_url(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: AiConfig = serde_json::from_str(&data)?;

        if cfg.models.is_empty() {
            anyhow::bail!("ai config must list at least one model");
        }
        // Clamp the sample size into 1..=len
        if let Some(n) = cfg.models_per_analysis {
            cfg.models_per_analysis = Some(n.clamp(1, cfg.models.len()));
        }

        Ok(cfg)
    }

    /// Load from `path`; any read/parse failure falls back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_default()
    }

    /// Effective sample size for one analysis.
    pub fn per_analysis_count(&self) -> usize {
        self.models_per_analysis
            .unwrap_or(self.models.len())
            .clamp(1, self.models.len())
    }
}
