//! Error types for locus-store.

use std::path::PathBuf;

/// Result type for locus-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in locus-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create a directory for the database or an export.
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored timestamp could not be parsed.
    #[error(transparent)]
    InvalidTimestamp(#[from] locus_types::ParseError),

    /// A stored document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing the CSV history failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An existing export holds rows that cannot be carried into a merge.
    #[error("{path} has {invalid} unreadable row(s); fix them or export with replace")]
    UnreadableHistory { path: PathBuf, invalid: usize },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
