//! Tidemark Core - grouped schema migrations
//!
//! This crate implements the migration engine following hexagonal architecture:
//!
//! - **domain**: Migration definitions, ledger records, run context, errors
//! - **ports**: Trait definitions for external dependencies (MigrationStore, MigrationSource)
//! - **services**: Use cases (migrate, rollback, status, scaffolding, event log)
//! - **adapters**: Concrete implementations (DuckDB, PostgreSQL, migration directories)

pub mod adapters;
pub mod config;
pub mod domain;
mod log_migrations;
pub mod ports;
pub mod services;

use std::sync::Arc;

use adapters::{DirectorySource, DuckDbStore, PostgresStore};
use config::{Config, DatabaseConfig};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, Result};
pub use domain::{
    AppliedMigration, Direction, GroupId, Migration, MigrationAction, MigrationGroup, MigrationId,
    RunContext,
};
pub use ports::{MigrationSource, MigrationStore};

/// Open the ledger store the configuration points at
///
/// Connection failures surface as `StoreUnavailable`.
pub fn open_store(config: &Config) -> Result<Arc<dyn MigrationStore>> {
    let store: Arc<dyn MigrationStore> = match &config.database {
        DatabaseConfig::Postgres(settings) => {
            Arc::new(PostgresStore::connect(settings, &config.ledger)?)
        }
        DatabaseConfig::DuckDb { path } => Arc::new(DuckDbStore::open(path, &config.ledger)?),
    };
    Ok(store)
}

/// Main context for Tidemark operations
///
/// Holds the loaded registry, the store handle and the services built on
/// them. One context serves one command.
pub struct TidemarkContext {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub store: Arc<dyn MigrationStore>,
    pub migrate_service: MigrateService,
    pub rollback_service: RollbackService,
    pub status_service: StatusService,
}

impl TidemarkContext {
    /// Load migrations from the configured directory and connect
    pub fn new(config: Config) -> Result<Self> {
        let registry = Arc::new(Registry::load(&DirectorySource::new(&config.migrations_dir))?);
        let store = open_store(&config)?;
        Ok(Self::with_parts(config, registry, store))
    }

    /// Build a context from an existing registry and store
    pub fn with_parts(
        config: Config,
        registry: Arc<Registry>,
        store: Arc<dyn MigrationStore>,
    ) -> Self {
        let migrate_service = MigrateService::new(Arc::clone(&registry), Arc::clone(&store));
        let rollback_service = RollbackService::new(Arc::clone(&registry), Arc::clone(&store));
        let status_service = StatusService::new(Arc::clone(&registry), Arc::clone(&store));

        Self {
            config,
            registry,
            store,
            migrate_service,
            rollback_service,
            status_service,
        }
    }

    /// Run context carrying the configured timeout, if any
    pub fn run_context(&self) -> RunContext {
        match self.config.timeout {
            Some(timeout) => RunContext::with_timeout(timeout),
            None => RunContext::new(),
        }
    }
}
