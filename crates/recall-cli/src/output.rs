use chrono::{DateTime, Utc};
use recall_engine::memory::MemoryItem;

#[derive(Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Cut `s` to at most `max_chars` characters, ending in "..." when cut
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

/// Short kind label: the role for raw messages, "L<n>" for summaries
pub fn item_kind(item: &MemoryItem) -> String {
    match item {
        MemoryItem::Raw(raw) => raw.role.to_string(),
        MemoryItem::Summary(summary) => format!("L{}", summary.level),
    }
}
