//! File-backed archive
//!
//! Append-only JSONL log: one `ArchiveRecord` per line. The whole file is
//! read into an in-memory index on open; every later record is appended and
//! flushed before it becomes visible to readers.

use dashmap::DashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{RecallError, Result};
use crate::memory::archive::ArchiveStore;
use crate::memory::types::{ArchiveRecord, ItemId};

pub const ARCHIVE_FILE_NAME: &str = "archive.jsonl";

pub struct JsonlArchive {
    path: PathBuf,
    writer: Mutex<File>,
    records: DashMap<ItemId, ArchiveRecord>,
}

impl JsonlArchive {
    /// Open or create the archive at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let records = DashMap::new();
        let existing = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        for (line_no, line) in existing.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ArchiveRecord>(line) {
                Ok(record) => {
                    records
                        .entry(record.superseded_by.clone())
                        .or_insert(record);
                }
                // a torn last line from an interrupted write
                Err(e) => warn!(
                    "Skipping unreadable archive line {} in {}: {}",
                    line_no + 1,
                    path.display(),
                    e
                ),
            }
        }

        let mut writer = OpenOptions::new().create(true).append(true).open(&path)?;
        if !existing.is_empty() && !existing.ends_with('\n') {
            writer.write_all(b"\n")?;
        }
        info!(
            "Opened archive {} with {} records",
            path.display(),
            records.len()
        );

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            records,
        })
    }

    /// Open `<data_dir>/archive.jsonl`
    pub fn open_in(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(data_dir.as_ref().join(ARCHIVE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArchiveStore for JsonlArchive {
    fn archive(&self, record: ArchiveRecord) -> Result<()> {
        // the writer lock serializes the check and the append
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| RecallError::ArchivalWrite("archive writer lock poisoned".to_string()))?;

        if self.records.contains_key(&record.superseded_by) {
            debug!("Archive record {} already present", record.superseded_by);
            return Ok(());
        }

        let mut line = serde_json::to_string(&record)
            .map_err(|e| RecallError::ArchivalWrite(e.to_string()))?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| {
                RecallError::ArchivalWrite(format!(
                    "failed to append to {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        debug!(
            "Archived {} items under {}",
            record.items.len(),
            record.superseded_by
        );
        self.records.insert(record.superseded_by.clone(), record);
        Ok(())
    }

    fn record(&self, summary_id: &ItemId) -> Option<ArchiveRecord> {
        self.records.get(summary_id).map(|r| r.value().clone())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
