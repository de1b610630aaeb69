//! Notifications about store changes
//!
//! Each engine publishes on a broadcast channel. Nothing in the engine reads
//! these back; they exist for observers such as debug tooling.

use std::collections::BTreeSet;
use tokio::sync::broadcast;

use crate::memory::types::ItemId;

/// Buffered events per channel before slow receivers start lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryEvent {
    RawAppended {
        entity: String,
        id: ItemId,
    },
    SummaryCreated {
        entity: String,
        id: ItemId,
        level: u32,
        covers: BTreeSet<ItemId>,
    },
    CompressionSkipped {
        entity: String,
        level: u32,
        reason: String,
    },
    BudgetInconsistency {
        entity: String,
        current: usize,
        max: usize,
    },
}

pub fn channel() -> broadcast::Sender<MemoryEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}
