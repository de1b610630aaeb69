//! Local extractive summarizer
//!
//! Keeps the leading sentence(s) of every item and cuts the result at a
//! character ceiling. Deterministic, offline, and never fails on non-empty
//! input, which makes it the safety net behind the remote oracle.

use async_trait::async_trait;

use crate::config::ExtractiveConfig;
use crate::oracle::{ItemContent, OracleError, SummarizationOracle, SummaryDraft};

const ELLIPSIS: &str = "...";

/// Summarizer that extracts leading sentences instead of generating text
#[derive(Debug, Clone)]
pub struct ExtractiveOracle {
    max_summary_chars: usize,
    sentences_per_item: usize,
}

impl ExtractiveOracle {
    pub fn new(config: &ExtractiveConfig) -> Self {
        Self {
            max_summary_chars: config.max_summary_chars.max(ELLIPSIS.len() + 1),
            sentences_per_item: config.sentences_per_item.max(1),
        }
    }

    /// Leading sentences of `content`, split on terminal punctuation
    fn lead(&self, content: &str) -> String {
        let sentences: Vec<&str> = content
            .split_inclusive(|c: char| matches!(c, '.' | '!' | '?'))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(self.sentences_per_item)
            .collect();
        sentences.join(" ")
    }

    /// Cut `text` to the character ceiling on a char boundary
    fn truncate(&self, text: &str) -> String {
        if text.chars().count() <= self.max_summary_chars {
            return text.to_string();
        }
        let keep = self.max_summary_chars - ELLIPSIS.len();
        let mut cut: String = text.chars().take(keep).collect();
        cut.truncate(cut.trim_end().len());
        cut.push_str(ELLIPSIS);
        cut
    }
}

#[async_trait]
impl SummarizationOracle for ExtractiveOracle {
    async fn summarize(
        &self,
        items: &[ItemContent],
        _persona: &str,
        _language: &str,
    ) -> Result<SummaryDraft, OracleError> {
        let joined = items
            .iter()
            .map(|item| self.lead(&item.content))
            .filter(|lead| !lead.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if joined.is_empty() {
            return Err(OracleError::Malformed(
                "Nothing to summarize".to_string(),
            ));
        }

        Ok(SummaryDraft::new(self.truncate(&joined)))
    }

    fn name(&self) -> &'static str {
        "extractive"
    }
}
