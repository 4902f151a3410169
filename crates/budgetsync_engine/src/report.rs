//! Run reports.
//!
//! A [`SyncReport`] is returned by every run, including aborted ones, and
//! serializes to the JSON summary printed by `budgetsync run --format json`.

use budgetsync_protocol::EntityKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::SyncError;

/// Per-kind record counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    /// Entity kind.
    pub entity: EntityKind,
    /// Records read and handed to the normalizer or dispatcher.
    pub attempted: u64,
    /// Records upserted.
    pub succeeded: u64,
    /// Records that failed normalization or upsert.
    pub failed: u64,
}

impl EntityReport {
    /// Zero counts for `entity`.
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            attempted: 0,
            succeeded: 0,
            failed: 0,
        }
    }
}

/// Why a record was not replicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FailureKind {
    /// A field could not be converted to its canonical form.
    Normalization {
        /// Column holding the bad value.
        field: String,
        /// What was wrong with it.
        reason: String,
    },
    /// The secondary store rejected the upsert or stayed unavailable.
    Upsert {
        /// Error reported by the store.
        message: String,
        /// Whether the last error was transient.
        retryable: bool,
    },
}

/// A single record that was skipped or rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Entity kind.
    pub entity: EntityKind,
    /// Primary-store id, when the row had a usable one.
    pub record_id: Option<i64>,
    /// Failure details.
    #[serde(flatten)]
    pub kind: FailureKind,
}

impl RecordFailure {
    /// A normalization failure on `field`.
    pub fn normalization(
        entity: EntityKind,
        record_id: Option<i64>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entity,
            record_id,
            kind: FailureKind::Normalization {
                field: field.into(),
                reason: reason.into(),
            },
        }
    }

    /// An upsert failure.
    pub fn upsert(entity: EntityKind, record_id: i64, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            entity,
            record_id: Some(record_id),
            kind: FailureKind::Upsert {
                message: message.into(),
                retryable,
            },
        }
    }

    /// Returns true for normalization failures.
    pub fn is_normalization(&self) -> bool {
        matches!(self.kind, FailureKind::Normalization { .. })
    }
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record_id {
            Some(id) => write!(f, "{} #{id}: ", self.entity)?,
            None => write!(f, "{} (no id): ", self.entity)?,
        }
        match &self.kind {
            FailureKind::Normalization { field, reason } => write!(f, "{field}: {reason}"),
            FailureKind::Upsert { message, .. } => write!(f, "upsert failed: {message}"),
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every planned kind was processed. Individual records may still have
    /// failed.
    Completed,
    /// A fatal condition stopped the run.
    Aborted {
        /// The condition.
        cause: SyncError,
    },
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Counts for each kind the run started, in plan order.
    pub entities: Vec<EntityReport>,
    /// Every record-level failure, in the order they occurred.
    pub failures: Vec<RecordFailure>,
    /// Upsert calls issued to the secondary store, retries excluded.
    pub dispatched: u64,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Run duration in milliseconds.
    pub duration_ms: u64,
}

impl SyncReport {
    pub(crate) fn start() -> Self {
        Self {
            outcome: RunOutcome::Completed,
            entities: Vec::new(),
            failures: Vec::new(),
            dispatched: 0,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub(crate) fn finish(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        self.duration_ms = u64::try_from(elapsed.num_milliseconds()).unwrap_or(0);
        self
    }

    /// Completed with no record failures.
    pub fn is_clean(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.failures.is_empty()
    }

    /// Completed, but some records failed.
    pub fn is_degraded(&self) -> bool {
        self.outcome == RunOutcome::Completed && !self.failures.is_empty()
    }

    /// Stopped by a fatal condition.
    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Aborted { .. })
    }

    /// The abort cause, if any.
    pub fn abort_cause(&self) -> Option<&SyncError> {
        match &self.outcome {
            RunOutcome::Aborted { cause } => Some(cause),
            RunOutcome::Completed => None,
        }
    }

    /// Counts for `kind`, if the run started it.
    pub fn entity(&self, kind: EntityKind) -> Option<&EntityReport> {
        self.entities.iter().find(|report| report.entity == kind)
    }

    /// Counts summed over every kind.
    pub fn totals(&self) -> (u64, u64, u64) {
        self.entities.iter().fold((0, 0, 0), |(a, s, f), report| {
            (a + report.attempted, s + report.succeeded, f + report.failed)
        })
    }
}
