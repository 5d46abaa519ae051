//! Error types for the entity store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during entity store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open or create the database file.
    #[error("Failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Failed to create the directory holding the database file.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to run a database migration.
    #[error("Database migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    /// A query failed.
    #[error("Database query failed: {0}")]
    Query(String),

    /// A write's condition did not hold against the stored item.
    #[error("Conditional check failed for {key}")]
    ConditionFailed { key: String },

    /// A batch or transaction exceeded the per-request item limit.
    #[error("Too many items for {operation}: {count} (max {max})")]
    TooManyItems {
        operation: &'static str,
        count: usize,
        max: usize,
    },

    /// A stored item lacks an attribute its decoder requires.
    #[error("Item is missing attribute {0}")]
    MissingAttribute(String),

    /// Stored attributes could not be decoded.
    #[error("Failed to decode stored item: {0}")]
    Decode(#[from] serde_json::Error),

    /// Failed to spawn a blocking task.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    /// The database schema version is newer than supported.
    #[error("Database schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },
}

impl StoreError {
    /// Create a Query error from a rusqlite error.
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }

    pub fn is_condition_failed(&self) -> bool {
        matches!(self, Self::ConditionFailed { .. })
    }
}
