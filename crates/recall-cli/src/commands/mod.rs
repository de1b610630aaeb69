pub mod append;
pub mod archive;
pub mod context;
pub mod speak;
pub mod stats;

pub use append::AppendCommand;
pub use archive::ArchiveCommand;
pub use context::ContextCommand;
pub use speak::SpeakCommand;
pub use stats::StatsCommand;
