//! Error types for the sync engine.

use budgetsync_protocol::{EntityKind, ProtocolError};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Which of the two stores an error concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSide {
    /// The transactional store rows are read from.
    Primary,
    /// The analytical store rows are upserted into.
    Secondary,
}

impl fmt::Display for StoreSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreSide::Primary => f.write_str("primary"),
            StoreSide::Secondary => f.write_str("secondary"),
        }
    }
}

/// Conditions that end a run.
///
/// Row-level problems never surface as a `SyncError`; they are recorded as
/// [`RecordFailure`](crate::RecordFailure)s in the report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// A store could not be reached when the run started.
    #[error("cannot connect to {store} store: {message}")]
    Connection {
        /// Store that failed.
        store: StoreSide,
        /// Underlying cause.
        message: String,
    },

    /// A store became unreachable mid-run.
    #[error("lost connection to {store} store: {message}")]
    ConnectionLost {
        /// Store that failed.
        store: StoreSide,
        /// Underlying cause.
        message: String,
    },

    /// An entity table could not be read.
    #[error("failed to read {entity}: {message}")]
    Read {
        /// Entity being read.
        entity: EntityKind,
        /// Underlying cause.
        message: String,
    },

    /// The run was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// The requested entity order violates a dependency.
    #[error("invalid sync plan: {0}")]
    InvalidPlan(#[from] ProtocolError),

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `run` was called while another run on the same engine was active.
    #[error("a sync run is already in progress")]
    AlreadyRunning,
}

impl SyncError {
    /// Creates a connection error for `store`.
    pub fn connection(store: StoreSide, message: impl Into<String>) -> Self {
        Self::Connection {
            store,
            message: message.into(),
        }
    }

    /// Creates a read error for `entity`.
    pub fn read(entity: EntityKind, message: impl Into<String>) -> Self {
        Self::Read {
            entity,
            message: message.into(),
        }
    }

    /// Returns true if a later run may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connection { .. } | SyncError::ConnectionLost { .. } | SyncError::AlreadyRunning
        )
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Connection { .. } => "connection",
            SyncError::ConnectionLost { .. } => "connection_lost",
            SyncError::Read { .. } => "read",
            SyncError::Cancelled => "cancelled",
            SyncError::InvalidPlan(_) => "invalid_plan",
            SyncError::Config(_) => "config",
            SyncError::AlreadyRunning => "already_running",
        }
    }
}

impl Serialize for SyncError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SyncError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Failure of a single procedure call on the secondary store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecuteError {
    /// Description from the store or transport.
    pub message: String,
    /// Whether repeating the call may succeed.
    pub retryable: bool,
}

impl ExecuteError {
    /// A transient failure (timeout, busy store, dropped connection).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure the store will repeat for the same input (constraint
    /// violation, rejected value).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}
