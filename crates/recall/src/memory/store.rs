//! Per-entity store of active memory items
//!
//! Items are kept in chronological reading order with a position index so
//! coverage and contiguity checks never rescan the list. Removing items is
//! only possible through `replace`, which archives them under the summary
//! that supersedes them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{RecallError, Result};
use crate::memory::archive::ArchiveStore;
use crate::memory::types::{
    ArchiveRecord, Budget, ItemId, MemoryItem, RawItem, Role, SummaryItem, char_len,
};

const RAW_ID_KIND: &str = "msg";
const SUMMARY_ID_KIND: &str = "sum";

/// Point-in-time counters for a store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_items: usize,
    pub raw_count: usize,
    pub summary_count: usize,
    pub l1_count: usize,
    /// Highest summary level present, 0 when there are no summaries
    pub max_level: u32,
    pub total_characters: usize,
    pub budget: Budget,
}

/// Ordered collection of raw messages and summaries for one entity
pub struct MemoryStore {
    entity: String,
    items: Vec<MemoryItem>,
    index: HashMap<ItemId, usize>,
    budget: Budget,
    message_counter: u64,
    last_l1_at: Option<DateTime<Utc>>,
    archived: Vec<ItemId>,
    archive: Arc<dyn ArchiveStore>,
}

impl MemoryStore {
    pub fn new(
        entity: impl Into<String>,
        max_characters: usize,
        archive: Arc<dyn ArchiveStore>,
    ) -> Self {
        Self {
            entity: entity.into(),
            items: Vec::new(),
            index: HashMap::new(),
            budget: Budget::new(max_characters),
            message_counter: 0,
            last_l1_at: None,
            archived: Vec::new(),
            archive,
        }
    }

    /// Rebuild a store from persisted parts.
    ///
    /// The budget is recomputed from the items; every item must carry a
    /// character count matching its content.
    pub fn restore(
        entity: impl Into<String>,
        max_characters: usize,
        items: Vec<MemoryItem>,
        message_counter: u64,
        last_l1_at: Option<DateTime<Utc>>,
        archived: Vec<ItemId>,
        archive: Arc<dyn ArchiveStore>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.id().clone()) {
                return Err(RecallError::Storage(format!(
                    "Duplicate item ID in snapshot: {}",
                    item.id()
                )));
            }
            if item.character_count() != char_len(item.content()) {
                return Err(RecallError::Storage(format!(
                    "Stale character count for item {}",
                    item.id()
                )));
            }
        }

        let mut store = Self {
            entity: entity.into(),
            items,
            index: HashMap::new(),
            budget: Budget::new(max_characters),
            message_counter,
            last_l1_at,
            archived,
            archive,
        };
        store.reindex();
        Ok(store)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Active items in chronological reading order
    pub fn items(&self) -> &[MemoryItem] {
        &self.items
    }

    pub fn get(&self, id: &ItemId) -> Option<&MemoryItem> {
        self.index.get(id).map(|&pos| &self.items[pos])
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn message_counter(&self) -> u64 {
        self.message_counter
    }

    /// When the most recent L1 summary was inserted
    pub fn last_l1_at(&self) -> Option<DateTime<Utc>> {
        self.last_l1_at
    }

    /// Summary IDs under which this store archived items, oldest first
    pub fn archived_summaries(&self) -> &[ItemId] {
        &self.archived
    }

    pub fn archive(&self) -> &Arc<dyn ArchiveStore> {
        &self.archive
    }

    /// Summaries divided by active items; 0.0 for an empty store
    pub fn summary_ratio(&self) -> f32 {
        if self.items.is_empty() {
            return 0.0;
        }
        let summaries = self.items.iter().filter(|i| !i.is_raw()).count();
        summaries as f32 / self.items.len() as f32
    }

    /// Allocate the next raw message ID
    pub fn next_raw_id(&mut self) -> ItemId {
        self.next_id(RAW_ID_KIND)
    }

    /// Allocate the next summary ID
    pub fn next_summary_id(&mut self) -> ItemId {
        self.next_id(SUMMARY_ID_KIND)
    }

    fn next_id(&mut self, kind: &str) -> ItemId {
        self.message_counter += 1;
        ItemId::generate(
            &format!("{}-{}", self.entity, kind),
            Utc::now(),
            self.message_counter,
        )
    }

    /// Append a raw message at the end of the store
    pub fn append(&mut self, content: impl Into<String>, role: Role) -> RawItem {
        let id = self.next_raw_id();
        let raw = RawItem::new(id, content.into(), role);

        self.budget.current_characters += raw.character_count;
        self.index.insert(raw.id.clone(), self.items.len());
        self.items.push(MemoryItem::Raw(raw.clone()));

        debug!(
            entity = %self.entity,
            id = %raw.id,
            chars = raw.character_count,
            budget = self.budget.current_characters,
            "Appended raw item"
        );
        raw
    }

    /// Replace a contiguous block of active items with a summary.
    ///
    /// The covered items are archived under the summary's ID before the
    /// active list is touched; if archiving fails nothing changes.
    pub fn replace(&mut self, covered: &BTreeSet<ItemId>, summary: SummaryItem) -> Result<()> {
        let (first, last) = self.validate_coverage(covered, &summary)?;

        let removed: Vec<MemoryItem> = self.items[first..=last].to_vec();
        let record = ArchiveRecord::new(summary.id.clone(), removed);
        self.archive.archive(record)?;

        let summary_id = summary.id.clone();
        let level = summary.level;
        let timestamp = summary.timestamp;
        self.items
            .splice(first..=last, std::iter::once(MemoryItem::Summary(summary)));
        self.reindex();
        self.archived.push(summary_id.clone());
        if level == 1 {
            self.last_l1_at = Some(timestamp);
        }

        debug!(
            entity = %self.entity,
            summary = %summary_id,
            level,
            covered = covered.len(),
            budget = self.budget.current_characters,
            "Replaced block with summary"
        );
        Ok(())
    }

    /// Check a replace request and return the covered position range
    fn validate_coverage(
        &self,
        covered: &BTreeSet<ItemId>,
        summary: &SummaryItem,
    ) -> Result<(usize, usize)> {
        if covered.is_empty() {
            return Err(RecallError::InvalidCoverage(
                "no items to cover".to_string(),
            ));
        }
        if summary.covers != *covered {
            return Err(RecallError::InvalidCoverage(format!(
                "summary {} covers a different set than requested",
                summary.id
            )));
        }
        if summary.level == 0 {
            return Err(RecallError::InvalidCoverage(format!(
                "summary {} has level 0",
                summary.id
            )));
        }
        if summary.character_count != char_len(&summary.content) {
            return Err(RecallError::InvalidCoverage(format!(
                "summary {} has a stale character count",
                summary.id
            )));
        }
        if self.contains(&summary.id) || self.archive.record(&summary.id).is_some() {
            return Err(RecallError::InvalidCoverage(format!(
                "summary ID {} is already in use",
                summary.id
            )));
        }

        let mut positions = Vec::with_capacity(covered.len());
        for id in covered {
            let pos = self.position(id).ok_or_else(|| {
                RecallError::InvalidCoverage(format!("item {id} is not active"))
            })?;
            let expected = summary.level - 1;
            let actual = self.items[pos].level();
            if actual != expected {
                return Err(RecallError::InvalidCoverage(format!(
                    "level {} summary cannot cover {id} at level {actual}",
                    summary.level
                )));
            }
            positions.push(pos);
        }

        positions.sort_unstable();
        let first = positions[0];
        let last = positions[positions.len() - 1];
        if last - first + 1 != positions.len() {
            return Err(RecallError::InvalidCoverage(format!(
                "covered items are not contiguous (positions {first}..={last}, {} items)",
                positions.len()
            )));
        }

        Ok((first, last))
    }

    fn reindex(&mut self) {
        self.index = self
            .items
            .iter()
            .enumerate()
            .map(|(pos, item)| (item.id().clone(), pos))
            .collect();
        self.budget.current_characters = self.items.iter().map(|i| i.character_count()).sum();
    }

    pub fn stats(&self) -> StoreStats {
        let mut raw_count = 0;
        let mut summary_count = 0;
        let mut l1_count = 0;
        let mut max_level = 0;

        for item in &self.items {
            match item {
                MemoryItem::Raw(_) => raw_count += 1,
                MemoryItem::Summary(summary) => {
                    summary_count += 1;
                    if summary.level == 1 {
                        l1_count += 1;
                    }
                    max_level = max_level.max(summary.level);
                }
            }
        }

        StoreStats {
            total_items: self.items.len(),
            raw_count,
            summary_count,
            l1_count,
            max_level,
            total_characters: self.budget.current_characters,
            budget: self.budget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::archive::InMemoryArchive;
    use crate::memory::types::SummaryMetadata;

    fn store(max: usize) -> (MemoryStore, Arc<InMemoryArchive>) {
        let archive = Arc::new(InMemoryArchive::new());
        (MemoryStore::new("alice", max, archive.clone()), archive)
    }

    fn summary_for(
        store: &mut MemoryStore,
        level: u32,
        ids: &[&ItemId],
        content: &str,
    ) -> (BTreeSet<ItemId>, SummaryItem) {
        let covers: BTreeSet<ItemId> = ids.iter().map(|id| (*id).clone()).collect();
        let summary = SummaryItem::new(
            store.next_summary_id(),
            level,
            content.to_string(),
            covers.clone(),
            vec![],
            SummaryMetadata {
                original_message_count: ids.len(),
                compression_ratio: 1.0,
                quality_score: 0.5,
            },
        );
        (covers, summary)
    }

    fn assert_budget_consistent(store: &MemoryStore) {
        let sum: usize = store.items().iter().map(|i| i.character_count()).sum();
        assert_eq!(store.budget().current_characters, sum);
    }

    #[test]
    fn test_append_assigns_unique_ids_and_updates_budget() {
        let (mut store, _) = store(1000);
        let a = store.append("hello", Role::User);
        let b = store.append("hi there", Role::Assistant);

        assert_ne!(a.id, b.id);
        assert!(a.id.as_str().starts_with("alice-msg_"));
        assert!(b.id.as_str().ends_with("_2"));
        assert_eq!(store.budget().current_characters, 13);
        assert_eq!(store.len(), 2);
        assert_budget_consistent(&store);
    }

    #[test]
    fn test_replace_inserts_summary_at_earliest_position() {
        let (mut store, archive) = store(1000);
        let r1 = store.append("one", Role::User).id;
        let r2 = store.append("two", Role::Assistant).id;
        let r3 = store.append("three", Role::User).id;

        let (covers, summary) = summary_for(&mut store, 1, &[&r1, &r2], "s");
        let summary_id = summary.id.clone();
        store.replace(&covers, summary).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.items()[0].id(), &summary_id);
        assert_eq!(store.items()[1].id(), &r3);
        assert!(!store.contains(&r1));
        assert_eq!(store.budget().current_characters, 6);
        assert_budget_consistent(&store);
        assert_eq!(archive.lookup(&summary_id).unwrap().len(), 2);
        assert_eq!(store.archived_summaries(), &[summary_id]);
        assert!(store.last_l1_at().is_some());
    }

    #[test]
    fn test_replace_rejects_non_contiguous() {
        let (mut store, archive) = store(1000);
        let r1 = store.append("one", Role::User).id;
        let _r2 = store.append("two", Role::Assistant).id;
        let r3 = store.append("three", Role::User).id;

        let (covers, summary) = summary_for(&mut store, 1, &[&r1, &r3], "s");
        let err = store.replace(&covers, summary).unwrap_err();

        assert!(matches!(err, RecallError::InvalidCoverage(_)));
        assert_eq!(store.len(), 3);
        assert!(archive.is_empty());
        assert_budget_consistent(&store);
    }

    #[test]
    fn test_replace_rejects_inactive_ids() {
        let (mut store, _) = store(1000);
        let r1 = store.append("one", Role::User).id;
        let ghost = ItemId::new("alice-msg_0_99");

        let (covers, summary) = summary_for(&mut store, 1, &[&r1, &ghost], "s");
        let err = store.replace(&covers, summary).unwrap_err();
        assert!(err.to_string().contains("not active"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_rejects_level_skipping() {
        let (mut store, _) = store(1000);
        let r1 = store.append("one", Role::User).id;
        let r2 = store.append("two", Role::Assistant).id;

        let (covers, summary) = summary_for(&mut store, 2, &[&r1, &r2], "s");
        let err = store.replace(&covers, summary).unwrap_err();
        assert!(err.to_string().contains("level 2 summary cannot cover"));
    }

    #[test]
    fn test_replace_rejects_mismatched_cover_set() {
        let (mut store, _) = store(1000);
        let r1 = store.append("one", Role::User).id;
        let r2 = store.append("two", Role::Assistant).id;

        let (_, summary) = summary_for(&mut store, 1, &[&r1, &r2], "s");
        let only_first: BTreeSet<ItemId> = [r1].into_iter().collect();
        assert!(store.replace(&only_first, summary).is_err());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_replace_rejects_empty_cover_set() {
        let (mut store, _) = store(1000);
        store.append("one", Role::User);
        let (covers, summary) = summary_for(&mut store, 1, &[], "s");
        assert!(matches!(
            store.replace(&covers, summary),
            Err(RecallError::InvalidCoverage(_))
        ));
    }

    #[test]
    fn test_replace_second_level() {
        let (mut store, archive) = store(1000);
        let r1 = store.append("one", Role::User).id;
        let r2 = store.append("two", Role::Assistant).id;
        let r3 = store.append("three", Role::User).id;
        let r4 = store.append("four", Role::Assistant).id;

        let (c1, s1) = summary_for(&mut store, 1, &[&r1, &r2], "first");
        let s1_id = s1.id.clone();
        store.replace(&c1, s1).unwrap();
        let (c2, s2) = summary_for(&mut store, 1, &[&r3, &r4], "second");
        let s2_id = s2.id.clone();
        store.replace(&c2, s2).unwrap();

        let (c3, l2) = summary_for(&mut store, 2, &[&s1_id, &s2_id], "both");
        let l2_id = l2.id.clone();
        store.replace(&c3, l2).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().max_level, 2);
        let archived = archive.lookup(&l2_id).unwrap();
        assert_eq!(archived.len(), 2);
        assert!(archived.iter().all(|i| i.level() == 1));
        assert_budget_consistent(&store);
    }

    #[test]
    fn test_stats_counts_and_is_idempotent() {
        let (mut store, _) = store(10);
        let r1 = store.append("aaaa", Role::User).id;
        let r2 = store.append("bbbb", Role::Assistant).id;
        store.append("cccc", Role::User);

        let (covers, summary) = summary_for(&mut store, 1, &[&r1, &r2], "ab");
        store.replace(&covers, summary).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.raw_count, 1);
        assert_eq!(stats.summary_count, 1);
        assert_eq!(stats.l1_count, 1);
        assert_eq!(stats.total_characters, 6);
        assert_eq!(stats.budget.max_characters, 10);
        assert_eq!(stats, store.stats());
        assert!((store.summary_ratio() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_restore_recomputes_budget() {
        let archive: Arc<dyn ArchiveStore> = Arc::new(InMemoryArchive::new());
        let items = vec![
            MemoryItem::Raw(RawItem::new(ItemId::new("r1"), "abc".into(), Role::User)),
            MemoryItem::Raw(RawItem::new(ItemId::new("r2"), "de".into(), Role::Assistant)),
        ];
        let store = MemoryStore::restore("bob", 50, items, 2, None, vec![], archive).unwrap();
        assert_eq!(store.budget().current_characters, 5);
        assert_eq!(store.position(&ItemId::new("r2")), Some(1));
        assert_eq!(store.message_counter(), 2);
    }

    #[test]
    fn test_restore_rejects_stale_character_count() {
        let archive: Arc<dyn ArchiveStore> = Arc::new(InMemoryArchive::new());
        let mut raw = RawItem::new(ItemId::new("r1"), "abc".into(), Role::User);
        raw.character_count = 99;
        let result =
            MemoryStore::restore("bob", 50, vec![MemoryItem::Raw(raw)], 1, None, vec![], archive);
        assert!(matches!(result, Err(RecallError::Storage(_))));
    }
}
