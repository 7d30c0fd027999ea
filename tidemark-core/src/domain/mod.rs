//! Core domain entities
//!
//! Migration definitions, ledger records, and the run context. These are
//! plain data structures with validation logic; no I/O happens here.

pub mod group;
pub mod migration;
pub mod result;
mod run_context;

pub use group::{AppliedMigration, GroupId, MigrationGroup};
pub use migration::{normalize_name, Direction, Migration, MigrationAction, MigrationId};
pub use run_context::RunContext;
