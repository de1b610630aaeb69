//! Per-entity snapshots
//!
//! An `EntitySnapshot` is the persisted shape of one entity: its raw
//! messages, its summaries, the archive records it produced and the budget.
//! `order` keeps the interleaving of messages and summaries so the active
//! list can be rebuilt exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{RecallError, Result};
use crate::memory::types::{ArchiveRecord, Budget, ItemId, MemoryItem, RawItem, SummaryItem};

const ENTITIES_DIR: &str = "entities";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: String,
    pub persona: String,
    pub messages: Vec<RawItem>,
    pub summaries: Vec<SummaryItem>,
    #[serde(default)]
    pub archived_messages: Vec<ArchiveRecord>,
    pub budget: Budget,
    /// Active item IDs in reading order
    pub order: Vec<ItemId>,
    pub message_counter: u64,
    #[serde(default)]
    pub last_l1_at: Option<DateTime<Utc>>,
}

impl EntitySnapshot {
    /// Rebuild the active item list in reading order
    pub fn items(&self) -> Result<Vec<MemoryItem>> {
        let expected = self.messages.len() + self.summaries.len();
        if self.order.len() != expected {
            return Err(RecallError::Storage(format!(
                "snapshot for {} lists {} items in order but holds {}",
                self.entity,
                self.order.len(),
                expected
            )));
        }

        let mut by_id: HashMap<&ItemId, MemoryItem> = self
            .messages
            .iter()
            .map(|raw| (&raw.id, MemoryItem::Raw(raw.clone())))
            .chain(
                self.summaries
                    .iter()
                    .map(|summary| (&summary.id, MemoryItem::Summary(summary.clone()))),
            )
            .collect();

        self.order
            .iter()
            .map(|id| {
                by_id.remove(id).ok_or_else(|| {
                    RecallError::Storage(format!(
                        "snapshot for {} orders unknown or repeated item {}",
                        self.entity, id
                    ))
                })
            })
            .collect()
    }
}

/// Entity names double as file names
pub fn validate_entity_name(entity: &str) -> Result<()> {
    let valid = !entity.is_empty()
        && entity.len() <= 64
        && entity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RecallError::Config(format!(
            "Invalid entity name '{entity}': use 1-64 ASCII letters, digits, '-' or '_'"
        )))
    }
}

/// Directory of `<entity>.json` snapshot files
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Snapshots live in `<data_dir>/entities`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join(ENTITIES_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, entity: &str) -> Result<PathBuf> {
        validate_entity_name(entity)?;
        Ok(self.dir.join(format!("{entity}.json")))
    }

    pub fn exists(&self, entity: &str) -> bool {
        self.path_for(entity).map(|p| p.exists()).unwrap_or(false)
    }

    /// Write a snapshot, replacing any previous one atomically
    pub fn save(&self, snapshot: &EntitySnapshot) -> Result<PathBuf> {
        let path = self.path_for(&snapshot.entity)?;
        std::fs::create_dir_all(&self.dir)?;

        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        debug!(
            "Saved snapshot for {} ({} messages, {} summaries)",
            snapshot.entity,
            snapshot.messages.len(),
            snapshot.summaries.len()
        );
        Ok(path)
    }

    pub fn load(&self, entity: &str) -> Result<EntitySnapshot> {
        let path = self.path_for(entity)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RecallError::UnknownEntity(entity.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: EntitySnapshot = serde_json::from_str(&content)?;
        if snapshot.entity != entity {
            return Err(RecallError::Storage(format!(
                "{} holds a snapshot for {}",
                path.display(),
                snapshot.entity
            )));
        }
        info!("Loaded snapshot for {}", entity);
        Ok(snapshot)
    }

    /// Names of all saved entities, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entities: Vec<String> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| name.strip_suffix(".json").map(|s| s.to_string()))
            .filter(|name| validate_entity_name(name).is_ok())
            .collect();
        entities.sort();
        Ok(entities)
    }
}
