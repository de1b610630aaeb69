//! Archive of superseded items
//!
//! Every item removed from an active store is kept in exactly one
//! `ArchiveRecord`, keyed by the summary that replaced it. Records are
//! append-only and never count toward any budget.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::Result;
use crate::memory::types::{ArchiveRecord, ItemId, MemoryItem};

/// Append-only storage for archive records
///
/// Implementations must be safe for concurrent readers and must serialize
/// writers per record so a summary ID is never archived twice.
pub trait ArchiveStore: Send + Sync {
    /// Persist a record. Archiving a record whose `superseded_by` is already
    /// present is a no-op.
    fn archive(&self, record: ArchiveRecord) -> Result<()>;

    /// The record stored under a summary ID
    fn record(&self, summary_id: &ItemId) -> Option<ArchiveRecord>;

    /// Number of records held
    fn len(&self) -> usize;

    /// The original items a summary replaced
    fn lookup(&self, summary_id: &ItemId) -> Option<Vec<MemoryItem>> {
        self.record(summary_id).map(|record| record.items)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process archive backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryArchive {
    records: DashMap<ItemId, ArchiveRecord>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, ordered by summary ID
    pub fn records(&self) -> Vec<ArchiveRecord> {
        let mut records: Vec<ArchiveRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.superseded_by.cmp(&b.superseded_by));
        records
    }

    /// The summary whose record holds the given item, if it was archived
    pub fn superseded_by(&self, item_id: &ItemId) -> Option<ItemId> {
        self.records
            .iter()
            .find(|r| r.value().items.iter().any(|item| item.id() == item_id))
            .map(|r| r.key().clone())
    }
}

impl ArchiveStore for InMemoryArchive {
    fn archive(&self, record: ArchiveRecord) -> Result<()> {
        match self.records.entry(record.superseded_by.clone()) {
            Entry::Occupied(_) => {
                debug!("Archive record {} already present", record.superseded_by);
            }
            Entry::Vacant(vacant) => {
                debug!(
                    "Archiving {} items under {}",
                    record.items.len(),
                    record.superseded_by
                );
                vacant.insert(record);
            }
        }
        Ok(())
    }

    fn record(&self, summary_id: &ItemId) -> Option<ArchiveRecord> {
        self.records.get(summary_id).map(|r| r.value().clone())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
