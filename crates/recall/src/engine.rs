//! Per-entity memory engine
//!
//! Ties one `MemoryStore` to its compression scheduler and context
//! assembler. Every append runs the scheduler before returning, so callers
//! always observe the store after compression has settled.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::compression::{CompressionReport, CompressionScheduler};
use crate::config::Config;
use crate::context::ContextAssembler;
use crate::error::Result;
use crate::events::{self, MemoryEvent};
use crate::memory::archive::ArchiveStore;
use crate::memory::store::{MemoryStore, StoreStats};
use crate::memory::types::{ItemId, MemoryItem, RawItem, Role, SummaryItem};
use crate::oracle::SummarizationOracle;
use crate::storage::snapshot::{EntitySnapshot, validate_entity_name};

/// Where an entity is in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    MessageReceived,
    OracleResponsePending,
    ResponseAppended,
}

/// Result of an append: the new item and what the scheduler did after it
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub item: RawItem,
    pub report: CompressionReport,
}

pub struct MemoryEngine {
    persona: String,
    store: MemoryStore,
    scheduler: CompressionScheduler,
    assembler: ContextAssembler,
    events: broadcast::Sender<MemoryEvent>,
    turn_state: TurnState,
}

impl MemoryEngine {
    pub fn new(
        entity: impl Into<String>,
        persona: impl Into<String>,
        config: &Config,
        oracle: Arc<dyn SummarizationOracle>,
        archive: Arc<dyn ArchiveStore>,
    ) -> Result<Self> {
        let entity = entity.into();
        validate_entity_name(&entity)?;
        let store = MemoryStore::new(entity, config.memory.max_characters, archive);
        Ok(Self::with_store(store, persona.into(), config, oracle))
    }

    fn with_store(
        store: MemoryStore,
        persona: String,
        config: &Config,
        oracle: Arc<dyn SummarizationOracle>,
    ) -> Self {
        let scheduler = CompressionScheduler::new(
            config.memory.clone(),
            oracle,
            config.oracle.language.clone(),
            config.oracle.timeout(),
        );
        Self {
            persona,
            store,
            scheduler,
            assembler: ContextAssembler::new(&config.context),
            events: events::channel(),
            turn_state: TurnState::Idle,
        }
    }

    pub fn entity(&self) -> &str {
        self.store.entity()
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn_state
    }

    pub(crate) fn set_turn_state(&mut self, state: TurnState) {
        debug!(entity = self.entity(), from = ?self.turn_state, to = ?state, "Turn state");
        self.turn_state = state;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: MemoryEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Append a message and run the compression triggers
    pub async fn append(&mut self, content: impl Into<String>, role: Role) -> Result<AppendOutcome> {
        let item = self.store.append(content, role);
        self.emit(MemoryEvent::RawAppended {
            entity: self.entity().to_string(),
            id: item.id.clone(),
        });

        let report = self.scheduler.evaluate(&mut self.store, &self.persona).await?;
        self.publish_report(&report);

        Ok(AppendOutcome { item, report })
    }

    /// Append an incoming message and the reply to it, then run the
    /// compression triggers once.
    ///
    /// Both items are in the store before the scheduler runs, so an error
    /// from compression never leaves the message without its reply.
    pub async fn append_exchange(
        &mut self,
        message: impl Into<String>,
        reply: impl Into<String>,
    ) -> Result<AppendOutcome> {
        let entity = self.entity().to_string();
        let message = self.store.append(message, Role::User);
        let reply = self.store.append(reply, Role::Assistant);
        for id in [&message.id, &reply.id] {
            self.emit(MemoryEvent::RawAppended {
                entity: entity.clone(),
                id: id.clone(),
            });
        }

        let report = self.scheduler.evaluate(&mut self.store, &self.persona).await?;
        self.publish_report(&report);

        Ok(AppendOutcome { item: reply, report })
    }

    fn publish_report(&self, report: &CompressionReport) {
        let entity = self.entity().to_string();
        for created in &report.created {
            self.emit(MemoryEvent::SummaryCreated {
                entity: entity.clone(),
                id: created.id.clone(),
                level: created.level,
                covers: created.covers.clone(),
            });
        }
        if let Some(reason) = &report.skipped {
            self.emit(MemoryEvent::CompressionSkipped {
                entity: entity.clone(),
                level: report.skipped_level.unwrap_or(1),
                reason: reason.to_string(),
            });
        }
        if report.budget_inconsistent {
            let budget = self.store.budget();
            self.emit(MemoryEvent::BudgetInconsistency {
                entity,
                current: budget.current_characters,
                max: budget.max_characters,
            });
        }
    }

    /// Swap a contiguous block for a caller-built summary
    pub fn replace(&mut self, covered: &BTreeSet<ItemId>, summary: SummaryItem) -> Result<()> {
        let id = summary.id.clone();
        let level = summary.level;
        self.store.replace(covered, summary)?;
        self.emit(MemoryEvent::SummaryCreated {
            entity: self.entity().to_string(),
            id,
            level,
            covers: covered.clone(),
        });
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Context bounded by `max_chars`, or the configured default
    pub fn build_context(&self, query: &str, max_chars: Option<usize>) -> String {
        let max_chars = max_chars.unwrap_or(self.assembler.default_max_chars());
        self.assembler.build_context(&self.store, query, max_chars)
    }

    /// Original items a summary replaced
    pub fn lookup_archive(&self, summary_id: &ItemId) -> Option<Vec<MemoryItem>> {
        self.store.archive().lookup(summary_id)
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        let mut messages = Vec::new();
        let mut summaries = Vec::new();
        for item in self.store.items() {
            match item {
                MemoryItem::Raw(raw) => messages.push(raw.clone()),
                MemoryItem::Summary(summary) => summaries.push(summary.clone()),
            }
        }
        let archived_messages = self
            .store
            .archived_summaries()
            .iter()
            .filter_map(|id| self.store.archive().record(id))
            .collect();

        EntitySnapshot {
            entity: self.entity().to_string(),
            persona: self.persona.clone(),
            messages,
            summaries,
            archived_messages,
            budget: self.store.budget(),
            order: self.store.items().iter().map(|i| i.id().clone()).collect(),
            message_counter: self.store.message_counter(),
            last_l1_at: self.store.last_l1_at(),
        }
    }

    /// Rebuild an engine from a snapshot.
    ///
    /// The budget ceiling comes from `config` and the current size is
    /// recomputed from the items. Archive records in the snapshot are
    /// written to `archive` (a no-op for records it already holds).
    pub fn restore(
        snapshot: EntitySnapshot,
        config: &Config,
        oracle: Arc<dyn SummarizationOracle>,
        archive: Arc<dyn ArchiveStore>,
    ) -> Result<Self> {
        validate_entity_name(&snapshot.entity)?;
        let items = snapshot.items()?;

        let mut archived = Vec::with_capacity(snapshot.archived_messages.len());
        for record in snapshot.archived_messages {
            archived.push(record.superseded_by.clone());
            archive.archive(record)?;
        }

        let store = MemoryStore::restore(
            snapshot.entity,
            config.memory.max_characters,
            items,
            snapshot.message_counter,
            snapshot.last_l1_at,
            archived,
            archive,
        )?;
        info!(
            entity = store.entity(),
            items = store.len(),
            chars = store.budget().current_characters,
            "Restored entity"
        );

        Ok(Self::with_store(store, snapshot.persona, config, oracle))
    }
}
