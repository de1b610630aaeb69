//! Memory item types for the recall engine
//!
//! Defines the closed `MemoryItem` union (raw messages and multi-level
//! summaries), the character budget, and the append-only archive record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Identifier of a raw message or summary, formatted `prefix_timestamp_counter`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an ID from a prefix, a creation time and the store's message counter
    pub fn generate(prefix: &str, at: DateTime<Utc>, counter: u64) -> Self {
        Self(format!("{}_{}_{}", prefix, at.timestamp_millis(), counter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role of the author of a raw message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("Unknown role: {other}. Use user or assistant.")),
        }
    }
}

/// Character length used for budgeting
pub fn char_len(content: &str) -> usize {
    content.chars().count()
}

/// An uncompressed message as it was appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: ItemId,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub character_count: usize,
}

impl RawItem {
    pub fn new(id: ItemId, content: String, role: Role) -> Self {
        let character_count = char_len(&content);
        Self {
            id,
            content,
            role,
            timestamp: Utc::now(),
            character_count,
        }
    }
}

/// Diagnostics attached to a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    /// Raw messages ultimately represented by this summary
    pub original_message_count: usize,
    /// Input characters divided by summary characters
    pub compression_ratio: f32,
    /// Heuristic or oracle-supplied quality, 0.0-1.0. Never used as a gate.
    pub quality_score: f32,
}

/// A compressed stand-in for a contiguous block of lower-level items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub id: ItemId,
    /// 1 summarizes raw messages, N > 1 summarizes level N-1 summaries
    pub level: u32,
    pub content: String,
    pub covers: BTreeSet<ItemId>,
    pub topics: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub character_count: usize,
    pub metadata: SummaryMetadata,
}

impl SummaryItem {
    pub fn new(
        id: ItemId,
        level: u32,
        content: String,
        covers: BTreeSet<ItemId>,
        topics: Vec<String>,
        metadata: SummaryMetadata,
    ) -> Self {
        let character_count = char_len(&content);
        Self {
            id,
            level,
            content,
            covers,
            topics,
            timestamp: Utc::now(),
            character_count,
            metadata,
        }
    }
}

/// A single entry of an entity's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryItem {
    Raw(RawItem),
    Summary(SummaryItem),
}

impl MemoryItem {
    pub fn id(&self) -> &ItemId {
        match self {
            MemoryItem::Raw(raw) => &raw.id,
            MemoryItem::Summary(summary) => &summary.id,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            MemoryItem::Raw(raw) => &raw.content,
            MemoryItem::Summary(summary) => &summary.content,
        }
    }

    pub fn character_count(&self) -> usize {
        match self {
            MemoryItem::Raw(raw) => raw.character_count,
            MemoryItem::Summary(summary) => summary.character_count,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MemoryItem::Raw(raw) => raw.timestamp,
            MemoryItem::Summary(summary) => summary.timestamp,
        }
    }

    /// Compression level: 0 for raw messages
    pub fn level(&self) -> u32 {
        match self {
            MemoryItem::Raw(_) => 0,
            MemoryItem::Summary(summary) => summary.level,
        }
    }

    /// Number of raw messages this item stands for
    pub fn message_count(&self) -> usize {
        match self {
            MemoryItem::Raw(_) => 1,
            MemoryItem::Summary(summary) => summary.metadata.original_message_count,
        }
    }

    pub fn as_raw(&self) -> Option<&RawItem> {
        match self {
            MemoryItem::Raw(raw) => Some(raw),
            MemoryItem::Summary(_) => None,
        }
    }

    pub fn as_summary(&self) -> Option<&SummaryItem> {
        match self {
            MemoryItem::Raw(_) => None,
            MemoryItem::Summary(summary) => Some(summary),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, MemoryItem::Raw(_))
    }
}

/// Character ceiling for the active store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub max_characters: usize,
    /// Sum of `character_count` over active items; archived items excluded
    pub current_characters: usize,
}

impl Budget {
    pub fn new(max_characters: usize) -> Self {
        Self {
            max_characters,
            current_characters: 0,
        }
    }

    pub fn is_exceeded(&self) -> bool {
        self.current_characters > self.max_characters
    }

    pub fn remaining(&self) -> usize {
        self.max_characters.saturating_sub(self.current_characters)
    }
}

/// Items removed from the active store when a summary replaced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub superseded_by: ItemId,
    pub items: Vec<MemoryItem>,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveRecord {
    pub fn new(superseded_by: ItemId, items: Vec<MemoryItem>) -> Self {
        Self {
            superseded_by,
            items,
            archived_at: Utc::now(),
        }
    }
}
