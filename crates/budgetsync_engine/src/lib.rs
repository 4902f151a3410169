//! # budgetsync engine
//!
//! Cross-store synchronization engine.
//!
//! This crate provides:
//! - Entity readers over the primary store (lazy, paged, restartable)
//! - The field normalizer (canonical `YYYY-MM-DD` dates, decimal money)
//! - The upsert dispatcher (one named-parameter procedure call per record,
//!   bounded worker pool, retry of transient failures)
//! - The sync orchestrator (`Idle → Running(kind) → Completed | Aborted`)
//! - Secondary-store executors: HTTP RPC, local SQLite, and a recording mock
//!
//! ## Architecture
//!
//! A run walks the entity kinds of a [`SyncPlan`] in dependency order:
//! 1. Read every row of the kind from the primary store, page by page
//! 2. Normalize each row into a typed [`UpsertRequest`]
//! 3. Dispatch one upsert procedure call per record
//! 4. Advance to the next kind only once every record has an outcome
//!
//! ## Key Invariants
//!
//! - A kind is never started before the kinds it references have finished
//! - Every upsert is keyed by the primary-store id and safe to repeat
//! - Row-level failures are recorded and never stop the run
//! - Connection and read failures abort the run; both store handles are
//!   closed on every exit path
//! - Each run is a full pass; no state carries over between runs
//!
//! [`SyncPlan`]: budgetsync_protocol::SyncPlan
//! [`UpsertRequest`]: budgetsync_protocol::UpsertRequest

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod analytical;
mod cancel;
mod config;
mod dispatch;
mod engine;
mod error;
mod executor;
mod http;
mod normalize;
mod report;
mod source;

pub use analytical::{AnalyticalConnector, SqliteAnalyticalStore};
pub use cancel::CancelHandle;
pub use config::{RetryConfig, SyncConfig};
pub use dispatch::{BatchOutcome, Dispatcher};
pub use engine::{SyncEngine, SyncState};
pub use error::{ExecuteError, StoreSide, SyncError, SyncResult};
pub use executor::{ProcedureExecutor, RecordingExecutor, TargetConnector};
pub use http::{HttpClient, HttpConnector, HttpResponse, HttpRpcExecutor, ReqwestClient};
pub use normalize::{parse_date, parse_decimal, parse_flag, FieldNormalizer};
pub use report::{EntityReport, FailureKind, RecordFailure, RunOutcome, SyncReport};
pub use source::{
    EntityReader, EntitySource, MemorySource, SourceConnector, SqliteSource, SqliteSourceConnector,
};
