//! Memory items, the per-entity store and the archive of superseded items

pub mod analysis;
pub mod archive;
pub mod store;
pub mod types;

pub use archive::{ArchiveStore, InMemoryArchive};
pub use store::{MemoryStore, StoreStats};
pub use types::{
    ArchiveRecord, Budget, ItemId, MemoryItem, RawItem, Role, SummaryItem, SummaryMetadata,
};
