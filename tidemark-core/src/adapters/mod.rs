//! Adapter implementations (hexagonal architecture)
//!
//! Concrete implementations of the port traits: ledger stores for each
//! supported database, and the migration sources.

pub mod duckdb;
pub mod embedded;
pub mod filesystem;
mod ledger_sql;
pub mod postgres;

pub use self::duckdb::DuckDbStore;
pub use self::embedded::{EmbeddedMigration, EmbeddedSource};
pub use self::filesystem::DirectorySource;
pub use self::postgres::PostgresStore;
