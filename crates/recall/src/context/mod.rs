//! Context assembly
//!
//! Builds a bounded text block from a store for prompting. The most recent
//! raw messages are taken first, then summaries from the highest level down
//! (newest first within a level). Items are included whole or not at all, and
//! selection stops at the first item that no longer fits.
//!
//! Selected items are rendered in store order so the result still reads
//! chronologically.

use std::collections::HashSet;
use tracing::debug;

use crate::config::ContextConfig;
use crate::memory::store::MemoryStore;
use crate::memory::types::MemoryItem;

/// Builds prompt context from a memory store
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    recent_raw_items: usize,
    default_max_chars: usize,
}

impl ContextAssembler {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            recent_raw_items: config.recent_raw_items,
            default_max_chars: config.max_chars,
        }
    }

    pub fn default_max_chars(&self) -> usize {
        self.default_max_chars
    }

    /// Assemble context of at most `max_chars` characters.
    ///
    /// `query` is accepted for callers that rank candidates externally; no
    /// relevance ranking happens here.
    pub fn build_context(&self, store: &MemoryStore, query: &str, max_chars: usize) -> String {
        let items = store.items();
        let candidates = self.candidates(items);

        let mut used = 0;
        let mut selected = HashSet::new();
        for pos in candidates {
            let cost = render_item(&items[pos]).chars().count() + separator_cost(selected.len());
            if used + cost > max_chars {
                break;
            }
            used += cost;
            selected.insert(pos);
        }

        debug!(
            entity = store.entity(),
            query_len = query.len(),
            selected = selected.len(),
            chars = used,
            max_chars,
            "Assembled context"
        );

        items
            .iter()
            .enumerate()
            .filter(|(pos, _)| selected.contains(pos))
            .map(|(_, item)| render_item(item))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Store positions in selection priority order
    fn candidates(&self, items: &[MemoryItem]) -> Vec<usize> {
        let recent_raw = items
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, item)| item.is_raw())
            .take(self.recent_raw_items)
            .map(|(pos, _)| pos);

        let mut summaries: Vec<(u32, usize)> = items
            .iter()
            .enumerate()
            .filter_map(|(pos, item)| item.as_summary().map(|s| (s.level, pos)))
            .collect();
        // highest level first, newest first within a level
        summaries.sort_by(|a, b| b.cmp(a));

        recent_raw
            .chain(summaries.into_iter().map(|(_, pos)| pos))
            .collect()
    }
}

/// One line of context for an item
pub fn render_item(item: &MemoryItem) -> String {
    match item {
        MemoryItem::Raw(raw) => format!("{}: {}", raw.role, raw.content),
        MemoryItem::Summary(summary) => format!("[L{} summary] {}", summary.level, summary.content),
    }
}

/// Newline joining a line to the ones before it
fn separator_cost(lines_so_far: usize) -> usize {
    usize::from(lines_so_far > 0)
}
