//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The services
//! depend only on these traits, not on concrete implementations.

mod source;
mod store;

pub use source::MigrationSource;
pub use store::{MigrationStore, Statements, StoreTransaction, TransactionWork};
