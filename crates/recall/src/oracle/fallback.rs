//! Summarizer with fallback logic
//!
//! Tries the primary oracle first and falls back to the secondary on error.
//! If both fail, the secondary's error is returned.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::oracle::{ItemContent, OracleError, SummarizationOracle, SummaryDraft};

/// Summarizer that tries a primary oracle, then a secondary
pub struct FallbackOracle {
    primary: Arc<dyn SummarizationOracle>,
    secondary: Arc<dyn SummarizationOracle>,
}

impl FallbackOracle {
    pub fn new(
        primary: Arc<dyn SummarizationOracle>,
        secondary: Arc<dyn SummarizationOracle>,
    ) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl SummarizationOracle for FallbackOracle {
    async fn summarize(
        &self,
        items: &[ItemContent],
        persona: &str,
        language: &str,
    ) -> Result<SummaryDraft, OracleError> {
        match self.primary.summarize(items, persona, language).await {
            Ok(draft) => {
                debug!("{} summarizer succeeded", self.primary.name());
                return Ok(draft);
            }
            Err(e) => {
                warn!(
                    "{} summarizer failed: {}, trying {}",
                    self.primary.name(),
                    e,
                    self.secondary.name()
                );
            }
        }

        self.secondary
            .summarize(items, persona, language)
            .await
            .inspect_err(|e| warn!("{} summarizer also failed: {}", self.secondary.name(), e))
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}
