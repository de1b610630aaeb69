use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RecallError, Result};

/// Main configuration structure for the recall engine
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Budget and compression thresholds
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,
    /// Summarization / response oracle configuration
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Snapshot and archive storage
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from an explicit path, or from the first default
    /// location that exists, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".recall").join("config.toml")),
            dirs::config_dir().map(|c| c.join("recall").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecallError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| RecallError::Config(format!("Failed to parse config: {e}")))
    }
}

/// Budget and compression trigger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Character ceiling for the active store
    #[serde(default = "default_max_characters")]
    pub max_characters: usize,
    /// Number of exchanges that triggers an L1 summary
    #[serde(default = "default_l1_threshold")]
    pub l1_threshold: usize,
    /// Number of same-level summaries merged into one higher-level summary
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: usize,
    /// Keep the newest raw items out of the compression window
    #[serde(default = "default_keep_recent")]
    pub keep_recent: bool,
    /// How many raw items the keep-recent policy reserves
    #[serde(default = "default_keep_recent_count")]
    pub keep_recent_count: usize,
    /// Summary ratio above which hierarchical merging is allowed
    #[serde(default = "default_summary_ratio_trigger")]
    pub summary_ratio_trigger: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_characters: default_max_characters(),
            l1_threshold: default_l1_threshold(),
            merge_threshold: default_merge_threshold(),
            keep_recent: default_keep_recent(),
            keep_recent_count: default_keep_recent_count(),
            summary_ratio_trigger: default_summary_ratio_trigger(),
        }
    }
}

impl MemoryConfig {
    /// Number of raw items the keep-recent policy reserves (0 when disabled)
    pub fn reserved_recent(&self) -> usize {
        if self.keep_recent {
            self.keep_recent_count
        } else {
            0
        }
    }
}

fn default_max_characters() -> usize {
    32_000
}

fn default_l1_threshold() -> usize {
    5
}

fn default_merge_threshold() -> usize {
    4
}

fn default_keep_recent() -> bool {
    true
}

fn default_keep_recent_count() -> usize {
    2
}

fn default_summary_ratio_trigger() -> f32 {
    0.5
}

/// Context assembly configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    /// Most-recent raw items that are always considered first
    #[serde(default = "default_recent_raw_items")]
    pub recent_raw_items: usize,
    /// Default character ceiling for assembled context
    #[serde(default = "default_context_max_chars")]
    pub max_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            recent_raw_items: default_recent_raw_items(),
            max_chars: default_context_max_chars(),
        }
    }
}

fn default_recent_raw_items() -> usize {
    8
}

fn default_context_max_chars() -> usize {
    6000
}

/// Oracle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Provider type: extractive, remote, or hybrid
    #[serde(default = "default_oracle_provider")]
    pub provider: String,
    /// Upper bound for a single oracle call in seconds
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
    /// Persona passed to the oracle when none is set on the entity
    #[serde(default = "default_persona")]
    pub persona: String,
    /// Language summaries are written in
    #[serde(default = "default_language")]
    pub language: String,
    /// Remote API configuration
    #[serde(default)]
    pub remote: RemoteOracleConfig,
    /// Local extractive summarizer configuration
    #[serde(default)]
    pub extractive: ExtractiveConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_oracle_provider(),
            timeout_secs: default_oracle_timeout_secs(),
            persona: default_persona(),
            language: default_language(),
            remote: RemoteOracleConfig::default(),
            extractive: ExtractiveConfig::default(),
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_oracle_provider() -> String {
    "extractive".to_string()
}

fn default_oracle_timeout_secs() -> u64 {
    30
}

fn default_persona() -> String {
    "assistant".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

/// Remote API configuration for the oracle
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOracleConfig {
    /// API endpoint URL
    #[serde(default)]
    pub api_url: String,
    /// Environment variable name for API key
    #[serde(default = "default_remote_api_key_env")]
    pub api_key_env: String,
    /// Model identifier for remote API
    #[serde(default = "default_remote_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteOracleConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key_env: default_remote_api_key_env(),
            model: default_remote_model(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

fn default_remote_api_key_env() -> String {
    "RECALL_API_KEY".to_string()
}

fn default_remote_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_remote_timeout_secs() -> u64 {
    30
}

/// Extractive summarizer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractiveConfig {
    /// Maximum characters in a produced summary
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,
    /// Sentences kept from each summarized item
    #[serde(default = "default_sentences_per_item")]
    pub sentences_per_item: usize,
}

impl Default for ExtractiveConfig {
    fn default() -> Self {
        Self {
            max_summary_chars: default_max_summary_chars(),
            sentences_per_item: default_sentences_per_item(),
        }
    }
}

fn default_max_summary_chars() -> usize {
    200
}

fn default_sentences_per_item() -> usize {
    1
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for snapshots and the archive log
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".recall"))
        .unwrap_or_else(|| PathBuf::from(".recall"))
}
