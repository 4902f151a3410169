//! # budgetsync store
//!
//! SQLite primary store for the finance tracker.
//!
//! This crate provides:
//! - Schema bootstrap for the six entity tables and `sync_status`
//! - The insert operations the application performs (used by fixtures)
//! - Paged `SELECT *` reads of one entity table as [`RawRecord`]s
//! - Schema inspection (tables, columns, row counts)
//! - The analytical schema used when SQLite stands in for the secondary store
//!
//! [`RawRecord`]: budgetsync_protocol::RawRecord

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod database;
mod error;
mod models;
pub mod schema;

pub use database::{raw_record, ColumnInfo, PrimaryDatabase, TableInfo};
pub use error::{StoreError, StoreResult};
pub use models::{NewBudget, NewExpense, NewSavingsGoal, NewSavingsTransaction, NewUser, NewUserPreferences};
