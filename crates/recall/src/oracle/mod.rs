//! Oracles: the external text generators the engine delegates to
//!
//! The `SummarizationOracle` turns an ordered block of items into a summary;
//! the `ResponseOracle` produces an entity's reply during a multi-entity
//! turn. Both are treated as fallible, latent remote calls and are always
//! invoked through [`with_timeout`].

pub mod extractive;
pub mod fallback;
pub mod prompts;
pub mod remote;

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OracleConfig;
use crate::memory::types::{ItemId, MemoryItem};

pub use extractive::ExtractiveOracle;
pub use fallback::FallbackOracle;
pub use remote::RemoteOracle;

/// Content of one item handed to the summarization oracle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemContent {
    pub id: ItemId,
    /// "user", "assistant", or "L<n> summary"
    pub label: String,
    pub content: String,
    /// 0 for raw messages
    pub level: u32,
}

impl From<&MemoryItem> for ItemContent {
    fn from(item: &MemoryItem) -> Self {
        let label = match item {
            MemoryItem::Raw(raw) => raw.role.as_str().to_string(),
            MemoryItem::Summary(summary) => format!("L{} summary", summary.level),
        };
        Self {
            id: item.id().clone(),
            label,
            content: item.content().to_string(),
            level: item.level(),
        }
    }
}

/// What a summarization oracle returns
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryDraft {
    pub content: String,
    pub quality_score: Option<f32>,
    pub compression_ratio: Option<f32>,
}

impl SummaryDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            quality_score: None,
            compression_ratio: None,
        }
    }

    pub fn with_quality_score(mut self, score: f32) -> Self {
        self.quality_score = Some(score.clamp(0.0, 1.0));
        self
    }

    pub fn with_compression_ratio(mut self, ratio: f32) -> Self {
        self.compression_ratio = Some(ratio);
        self
    }
}

/// Oracle-specific errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Produces summaries for ordered blocks of items
#[async_trait]
pub trait SummarizationOracle: Send + Sync {
    /// Summarize `items` (oldest first) in the voice of `persona`, written in `language`
    async fn summarize(
        &self,
        items: &[ItemContent],
        persona: &str,
        language: &str,
    ) -> Result<SummaryDraft, OracleError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Produces an entity's reply to an incoming message
#[async_trait]
pub trait ResponseOracle: Send + Sync {
    /// Reply to `incoming_message` as `persona`, grounded on `context`
    async fn respond(
        &self,
        context: &str,
        incoming_message: &str,
        persona: &str,
    ) -> Result<String, OracleError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Run an oracle call with an upper bound; an elapsed timer is an oracle error
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, OracleError>
where
    F: Future<Output = Result<T, OracleError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout(timeout)),
    }
}

/// Build the summarizer selected by `config.provider`
pub fn build_summarizer(
    config: &OracleConfig,
) -> Result<Arc<dyn SummarizationOracle>, OracleError> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveOracle::new(&config.extractive))),
        "remote" => Ok(Arc::new(RemoteOracle::new(&config.remote)?)),
        "hybrid" => {
            let remote: Arc<dyn SummarizationOracle> = Arc::new(RemoteOracle::new(&config.remote)?);
            let local: Arc<dyn SummarizationOracle> =
                Arc::new(ExtractiveOracle::new(&config.extractive));
            Ok(Arc::new(FallbackOracle::new(remote, local)))
        }
        other => Err(OracleError::Config(format!(
            "Unknown oracle provider: {other}. Use extractive, remote, or hybrid."
        ))),
    }
}

/// Build the response oracle; replies always need the remote API
pub fn build_responder(config: &OracleConfig) -> Result<Arc<dyn ResponseOracle>, OracleError> {
    if config.remote.api_url.is_empty() {
        return Err(OracleError::Unavailable(
            "response generation needs [oracle.remote] api_url".to_string(),
        ));
    }
    Ok(Arc::new(RemoteOracle::new(&config.remote)?))
}
