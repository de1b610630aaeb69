pub mod commands;
pub mod error;
pub mod output;
pub mod workspace;

pub use commands::{AppendCommand, ArchiveCommand, ContextCommand, SpeakCommand, StatsCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_timestamp, item_kind, truncate_string};
pub use workspace::Workspace;
