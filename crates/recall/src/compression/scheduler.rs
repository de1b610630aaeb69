//! Compression scheduler
//!
//! Decides after every append whether a block of items must be summarized,
//! and which one. Summaries themselves come from the summarization oracle.
//!
//! Triggers are evaluated in a fixed order:
//! 1. L1: the run of raw items after the newest summary holds `l1_threshold`
//!    closed exchanges (excluding the reserved recent items). A reply closes
//!    an exchange, and so does a user turn that never got one.
//! 2. Budget: while over budget and the summary ratio is at most the merge
//!    trigger, summarize the oldest raw block.
//! 3. Merge: while over budget and the summary ratio is above the merge
//!    trigger, fold the oldest `merge_threshold` same-level summaries into one
//!    summary a level higher.
//!
//! An oracle failure ends the evaluation; the block stays uncompressed and
//! is picked up again on the next append.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::MemoryConfig;
use crate::error::{RecallError, Result};
use crate::memory::analysis::{extract_topics, quality_score};
use crate::memory::store::MemoryStore;
use crate::memory::types::{ItemId, MemoryItem, Role, SummaryItem, SummaryMetadata, char_len};
use crate::oracle::{ItemContent, SummarizationOracle, with_timeout};

/// Smallest block worth summarizing
const MIN_BLOCK_LEN: usize = 2;

/// A summary produced during one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSummary {
    pub id: ItemId,
    pub level: u32,
    pub covers: BTreeSet<ItemId>,
}

/// Why a compression cycle was abandoned
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The oracle failed, timed out, or returned nothing usable
    Oracle(String),
    /// The archive refused the record; the replace was rolled back
    Archive(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Oracle(msg) => write!(f, "oracle: {msg}"),
            SkipReason::Archive(msg) => write!(f, "archive: {msg}"),
        }
    }
}

/// Outcome of evaluating the triggers once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressionReport {
    pub created: Vec<CreatedSummary>,
    /// Set when a cycle was skipped; `skipped_level` is the level it targeted
    pub skipped: Option<SkipReason>,
    pub skipped_level: Option<u32>,
    /// Still over budget with nothing left to compress
    pub budget_inconsistent: bool,
}

impl CompressionReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.skipped.is_none() && !self.budget_inconsistent
    }
}

enum Cycle {
    Created(CreatedSummary),
    Skipped(SkipReason),
}

/// Decides when and what to compress for one store
pub struct CompressionScheduler {
    config: MemoryConfig,
    oracle: Arc<dyn SummarizationOracle>,
    language: String,
    timeout: Duration,
}

impl CompressionScheduler {
    pub fn new(
        config: MemoryConfig,
        oracle: Arc<dyn SummarizationOracle>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let mut config = config;
        config.l1_threshold = config.l1_threshold.max(1);
        config.merge_threshold = config.merge_threshold.max(MIN_BLOCK_LEN);
        Self {
            config,
            oracle,
            language: language.into(),
            timeout,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Evaluate all triggers against the store's current state
    pub async fn evaluate(
        &self,
        store: &mut MemoryStore,
        persona: &str,
    ) -> Result<CompressionReport> {
        let mut report = CompressionReport::default();
        let reserved = self.config.reserved_recent();

        if let Some(block) = select_l1_block(store.items(), self.config.l1_threshold, reserved) {
            info!(
                entity = store.entity(),
                items = block.len(),
                "L1 threshold reached"
            );
            if !self.run_cycle(store, persona, block, 1, &mut report).await? {
                return Ok(report);
            }
        }

        while store.budget().is_exceeded() {
            let budget = store.budget();
            let ratio = store.summary_ratio();

            let raw_block = || {
                select_budget_block(store.items(), self.config.l1_threshold, reserved)
                    .map(|block| (1, block))
            };
            let step = if ratio > self.config.summary_ratio_trigger {
                select_merge_block(store.items(), self.config.merge_threshold)
                    .map(|(level, block)| (level + 1, block))
                    .or_else(raw_block)
            } else {
                raw_block()
            };

            let Some((level, block)) = step else {
                debug!(
                    entity = store.entity(),
                    ratio, "No compressible block left"
                );
                break;
            };

            info!(
                entity = store.entity(),
                current = budget.current_characters,
                max = budget.max_characters,
                level,
                items = block.len(),
                "Budget exceeded, compressing"
            );
            if !self.run_cycle(store, persona, block, level, &mut report).await? {
                return Ok(report);
            }
        }

        if store.budget().is_exceeded() {
            let budget = store.budget();
            warn!(
                entity = store.entity(),
                current = budget.current_characters,
                max = budget.max_characters,
                "BudgetInconsistency: over budget with nothing left to compress"
            );
            report.budget_inconsistent = true;
        }

        Ok(report)
    }

    /// Run one cycle and record it; false means the evaluation must stop
    async fn run_cycle(
        &self,
        store: &mut MemoryStore,
        persona: &str,
        block: Vec<ItemId>,
        level: u32,
        report: &mut CompressionReport,
    ) -> Result<bool> {
        match self.compress(store, persona, block, level).await? {
            Cycle::Created(created) => {
                report.created.push(created);
                Ok(true)
            }
            Cycle::Skipped(reason) => {
                report.skipped = Some(reason);
                report.skipped_level = Some(level);
                Ok(false)
            }
        }
    }

    /// Summarize `block` into a level `level` summary and swap it in
    async fn compress(
        &self,
        store: &mut MemoryStore,
        persona: &str,
        block: Vec<ItemId>,
        level: u32,
    ) -> Result<Cycle> {
        let items: Vec<&MemoryItem> = block.iter().filter_map(|id| store.get(id)).collect();
        let contents: Vec<ItemContent> = items.iter().map(|item| ItemContent::from(*item)).collect();
        let input_chars: usize = items.iter().map(|item| item.character_count()).sum();
        let original_message_count: usize = items.iter().map(|item| item.message_count()).sum();
        let source_text = contents
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            entity = store.entity(),
            oracle = self.oracle.name(),
            level,
            items = contents.len(),
            input_chars,
            "Requesting summary"
        );

        let draft = match with_timeout(
            self.timeout,
            self.oracle.summarize(&contents, persona, &self.language),
        )
        .await
        {
            Ok(draft) if draft.content.trim().is_empty() => {
                warn!(
                    entity = store.entity(),
                    level, "Oracle returned an empty summary, will retry on next append"
                );
                return Ok(Cycle::Skipped(SkipReason::Oracle(
                    "empty summary".to_string(),
                )));
            }
            Ok(draft) => draft,
            Err(e) => {
                warn!(
                    entity = store.entity(),
                    level, "Summarization failed, will retry on next append: {}", e
                );
                return Ok(Cycle::Skipped(SkipReason::Oracle(e.to_string())));
            }
        };

        let content = draft.content.trim().to_string();
        let summary_chars = char_len(&content).max(1);
        let metadata = SummaryMetadata {
            original_message_count,
            compression_ratio: draft
                .compression_ratio
                .unwrap_or(input_chars as f32 / summary_chars as f32),
            quality_score: draft
                .quality_score
                .unwrap_or_else(|| quality_score(&content)),
        };
        let topics = extract_topics(&format!("{source_text}\n{content}"));
        let covers: BTreeSet<ItemId> = block.into_iter().collect();
        let summary = SummaryItem::new(
            store.next_summary_id(),
            level,
            content,
            covers.clone(),
            topics,
            metadata,
        );
        let id = summary.id.clone();

        match store.replace(&covers, summary) {
            Ok(()) => {
                info!(
                    entity = store.entity(),
                    summary = %id,
                    level,
                    covered = covers.len(),
                    budget = store.budget().current_characters,
                    "Created summary"
                );
                Ok(Cycle::Created(CreatedSummary { id, level, covers }))
            }
            Err(RecallError::ArchivalWrite(msg)) => {
                error!(
                    entity = store.entity(),
                    level, "Archive rejected record, compression rolled back: {}", msg
                );
                Ok(Cycle::Skipped(SkipReason::Archive(msg)))
            }
            Err(e) => Err(e),
        }
    }
}

/// Whether the raw item at `pos` ends an exchange: an assistant reply does,
/// and so does a user turn that was followed by another user turn instead
/// of a reply. A trailing user turn is still waiting and ends nothing.
fn closes_exchange(run: &[&MemoryItem], pos: usize) -> bool {
    match run[pos] {
        MemoryItem::Raw(raw) if raw.role == Role::Assistant => true,
        MemoryItem::Raw(_) => matches!(
            run.get(pos + 1),
            Some(MemoryItem::Raw(next)) if next.role == Role::User
        ),
        MemoryItem::Summary(_) => false,
    }
}

/// Number of leading items among the first `eligible` of `run` that hold
/// exactly `exchanges` closed exchanges. Items past `eligible` are only
/// looked at to tell whether a user turn went unanswered.
fn exchange_span(run: &[&MemoryItem], eligible: usize, exchanges: usize) -> Option<usize> {
    let mut closed = 0;
    for pos in 0..eligible.min(run.len()) {
        if closes_exchange(run, pos) {
            closed += 1;
            if closed == exchanges {
                return Some(pos + 1);
            }
        }
    }
    None
}

/// The raw items after the newest summary, oldest first, when they hold
/// `threshold` exchanges outside the reserved recent window
pub fn select_l1_block(
    items: &[MemoryItem],
    threshold: usize,
    reserved: usize,
) -> Option<Vec<ItemId>> {
    let start = items
        .iter()
        .rposition(|item| !item.is_raw())
        .map(|pos| pos + 1)
        .unwrap_or(0);
    let trailing: Vec<&MemoryItem> = items[start..].iter().collect();
    let eligible = trailing.len().checked_sub(reserved)?;
    let span = exchange_span(&trailing, eligible, threshold)?;
    Some(trailing[..span].iter().map(|item| item.id().clone()).collect())
}

/// The oldest run of raw items outside the reserved recent window, cut after
/// `threshold` exchanges or taken whole when it holds fewer
pub fn select_budget_block(
    items: &[MemoryItem],
    threshold: usize,
    reserved: usize,
) -> Option<Vec<ItemId>> {
    let raw_positions: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_raw())
        .map(|(pos, _)| pos)
        .collect();
    // first reserved raw, or the end of the list when nothing is reserved
    let eligible_until = match raw_positions.len().checked_sub(reserved) {
        Some(n) => raw_positions.get(n).copied().unwrap_or(items.len()),
        None => 0,
    };

    let mut pos = 0;
    while pos < eligible_until {
        if !items[pos].is_raw() {
            pos += 1;
            continue;
        }
        let run: Vec<&MemoryItem> = items[pos..]
            .iter()
            .take_while(|item| item.is_raw())
            .collect();
        let eligible = run.len().min(eligible_until - pos);
        if eligible >= MIN_BLOCK_LEN {
            let take = exchange_span(&run, eligible, threshold)
                .unwrap_or(eligible)
                .max(MIN_BLOCK_LEN);
            return Some(run[..take].iter().map(|item| item.id().clone()).collect());
        }
        pos += run.len();
    }
    None
}

/// The oldest `merge_threshold` adjacent summaries sharing the lowest
/// mergeable level, together with that level
pub fn select_merge_block(
    items: &[MemoryItem],
    merge_threshold: usize,
) -> Option<(u32, Vec<ItemId>)> {
    let max_level = items.iter().map(|item| item.level()).max().unwrap_or(0);

    for level in 1..=max_level {
        let mut run: Vec<&ItemId> = Vec::new();
        for item in items {
            if item.level() == level {
                run.push(item.id());
                if run.len() == merge_threshold {
                    return Some((level, run.into_iter().cloned().collect()));
                }
            } else {
                run.clear();
            }
        }
    }
    None
}
