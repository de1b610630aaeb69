//! Test utilities for recall - scripted oracles and a failing archive
//!
//! These mocks let unit and integration tests drive the scheduler and the
//! coordinator deterministically without a real LLM behind them.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{RecallError, Result};
use crate::memory::archive::ArchiveStore;
use crate::memory::types::{ArchiveRecord, ItemId};
use crate::oracle::{ItemContent, OracleError, ResponseOracle, SummarizationOracle, SummaryDraft};

/// Oracle that answers every call with fixed content.
///
/// Can be told to fail a number of calls first, or to sleep before
/// answering so timeouts can be exercised.
#[derive(Debug)]
pub struct ScriptedOracle {
    content: String,
    fail_remaining: AtomicUsize,
    delay: Option<Duration>,
    summarize_calls: AtomicUsize,
    respond_calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ItemContent>>>,
}

impl ScriptedOracle {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            fail_remaining: AtomicUsize::new(0),
            delay: None,
            summarize_calls: AtomicUsize::new(0),
            respond_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call
    pub fn failing() -> Self {
        Self::failing_first(usize::MAX, "")
    }

    /// Fails the first `failures` calls, then answers with `content`
    pub fn failing_first(failures: usize, content: impl Into<String>) -> Self {
        let oracle = Self::new(content);
        oracle.fail_remaining.store(failures, Ordering::SeqCst);
        oracle
    }

    /// Sleeps for `delay` before answering
    pub fn slow(content: impl Into<String>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(content)
        }
    }

    pub fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }

    pub fn respond_calls(&self) -> usize {
        self.respond_calls.load(Ordering::SeqCst)
    }

    /// Blocks passed to `summarize`, in call order
    pub fn requests(&self) -> Vec<Vec<ItemContent>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    async fn answer(&self) -> std::result::Result<String, OracleError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(OracleError::RequestFailed("scripted failure".to_string()));
        }
        Ok(self.content.clone())
    }
}

#[async_trait]
impl SummarizationOracle for ScriptedOracle {
    async fn summarize(
        &self,
        items: &[ItemContent],
        _persona: &str,
        _language: &str,
    ) -> std::result::Result<SummaryDraft, OracleError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(items.to_vec());
        }
        self.answer().await.map(SummaryDraft::new)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[async_trait]
impl ResponseOracle for ScriptedOracle {
    async fn respond(
        &self,
        _context: &str,
        _incoming_message: &str,
        _persona: &str,
    ) -> std::result::Result<String, OracleError> {
        self.respond_calls.fetch_add(1, Ordering::SeqCst);
        self.answer().await
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Archive whose writes always fail
#[derive(Debug, Default)]
pub struct FailingArchive;

impl ArchiveStore for FailingArchive {
    fn archive(&self, record: ArchiveRecord) -> Result<()> {
        Err(RecallError::ArchivalWrite(format!(
            "refusing to archive {}",
            record.superseded_by
        )))
    }

    fn record(&self, _summary_id: &ItemId) -> Option<ArchiveRecord> {
        None
    }

    fn len(&self) -> usize {
        0
    }
}
