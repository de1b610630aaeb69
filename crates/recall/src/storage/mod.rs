//! Persistence: per-entity JSON snapshots and the JSONL archive

pub mod jsonl;
pub mod snapshot;

pub use jsonl::JsonlArchive;
pub use snapshot::{EntitySnapshot, SnapshotStore, validate_entity_name};
