//! Recall - hierarchical memory compression for conversational agents
//!
//! Each entity keeps a character-bounded history of raw messages. When the
//! history grows, contiguous blocks are replaced by summaries (L1 over raw
//! messages, L2 over L1 summaries, and so on) produced by an external
//! summarization oracle. Replaced items are never lost: they move to an
//! append-only archive keyed by the summary that superseded them.

pub mod compression;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod oracle;
pub mod storage;
pub mod testing;

pub use config::Config;
pub use coordinator::Coordinator;
pub use engine::{AppendOutcome, MemoryEngine, TurnState};
pub use error::{RecallError, Result};
