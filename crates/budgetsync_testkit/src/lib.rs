//! # budgetsync testkit
//!
//! Test utilities for budgetsync.
//!
//! This crate provides:
//! - Temporary primary and analytical SQLite stores
//! - Seeded scenarios with known ids and expected counts
//! - Raw row builders for in-memory sources
//! - Property-based generators for dates, amounts and datasets
//!
//! ## Usage
//!
//! ```rust,ignore
//! use budgetsync_testkit::prelude::*;
//!
//! #[test]
//! fn reference_scenario() {
//!     let primary = TestPrimary::new();
//!     seed_reference_scenario(&primary);
//!     // ... run the engine against primary.path()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
