//! Compression: trigger evaluation and summary creation

pub mod scheduler;

pub use scheduler::{
    CompressionReport, CompressionScheduler, CreatedSummary, SkipReason, select_budget_block,
    select_l1_block, select_merge_block,
};
