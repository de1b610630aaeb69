//! Errors surfaced by the `recall` binary

use std::io;
use std::path::PathBuf;

use recall_engine::RecallError;
use recall_engine::oracle::OracleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Bad arguments, such as an unknown role
    #[error("{0}")]
    Usage(String),

    #[error("Unknown entity: {0} (append a message to create it)")]
    UnknownEntity(String),

    #[error("No archived items under {summary_id} for {entity}")]
    NotArchived { entity: String, summary_id: String },

    #[error("Cannot use data directory {path}: {source}", path = .path.display())]
    DataDir { path: PathBuf, source: io::Error },

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(RecallError),
}

impl From<RecallError> for CliError {
    fn from(e: RecallError) -> Self {
        match e {
            RecallError::UnknownEntity(entity) => CliError::UnknownEntity(entity),
            RecallError::Oracle(e) => CliError::Oracle(e),
            other => CliError::Engine(other),
        }
    }
}

impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError::Usage(s)
    }
}

impl From<&str> for CliError {
    fn from(s: &str) -> Self {
        CliError::Usage(s.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;
