//! Error types for the recall engine

use thiserror::Error;

use crate::oracle::OracleError;

/// Main error type for recall engine operations
#[derive(Error, Debug)]
pub enum RecallError {
    /// `replace()` was called with IDs that are not active, not contiguous,
    /// or at the wrong level for the summary that covers them
    #[error("Invalid coverage: {0}")]
    InvalidCoverage(String),

    /// Summarization or response oracle failed (timeout, transport, malformed output)
    #[error("Oracle failure: {0}")]
    Oracle(#[from] OracleError),

    /// The archive could not persist a record; the triggering replace was rolled back
    #[error("Archival write failure: {0}")]
    ArchivalWrite(String),

    /// No store is registered for the requested entity
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Snapshot storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RecallError {
    fn from(e: serde_json::Error) -> Self {
        RecallError::Serialization(e.to_string())
    }
}

/// Result type alias for recall engine operations
pub type Result<T> = std::result::Result<T, RecallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecallError::InvalidCoverage("item raw_1_3 is not active".to_string());
        assert_eq!(err.to_string(), "Invalid coverage: item raw_1_3 is not active");

        let err = RecallError::UnknownEntity("bob".to_string());
        assert_eq!(err.to_string(), "Unknown entity: bob");
    }

    #[test]
    fn test_oracle_error_converts() {
        let err: RecallError = OracleError::Malformed("empty summary".to_string()).into();
        assert!(matches!(err, RecallError::Oracle(_)));
        assert!(err.to_string().contains("empty summary"));
    }
}
