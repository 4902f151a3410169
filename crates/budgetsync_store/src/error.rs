//! Error types for the primary store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the primary store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database file could not be opened.
    #[error("cannot open {path}: {message}")]
    Open {
        /// Path that was opened.
        path: String,
        /// Underlying cause.
        message: String,
    },

    /// An entity table is missing.
    #[error("table not found: {0}")]
    MissingTable(String),

    /// A row could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true if the error means the store is unreachable.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, StoreError::Open { .. } | StoreError::Io(_))
    }
}
