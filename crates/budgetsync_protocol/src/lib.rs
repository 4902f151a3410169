//! # budgetsync protocol
//!
//! Entity and call-contract types shared by the budgetsync crates.
//!
//! This crate provides:
//! - `EntityKind` and the declared foreign-key dependencies between kinds
//! - `SyncPlan`, the dependency-ordered list of kinds a run walks
//! - `RawRecord` / `RawValue` for rows read from the primary store
//! - Typed per-entity records and the tagged `UpsertRequest`
//! - `ProcedureCall` / `ParamValue`, the named-parameter contract of the
//!   secondary store's upsert procedures
//!
//! This is a pure types crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod call;
mod entity;
mod error;
mod plan;
mod record;
mod value;

pub use call::{ParamValue, ProcedureCall, WIRE_DATE_FORMAT};
pub use entity::EntityKind;
pub use error::{ProtocolError, ProtocolResult};
pub use plan::SyncPlan;
pub use record::{
    BudgetRecord, EntityRecord, ExpenseRecord, SavingsGoalRecord, SavingsTransactionRecord,
    TransactionType, UpsertRequest, UserPreferencesRecord, UserRecord,
};
pub use value::{RawRecord, RawValue};
