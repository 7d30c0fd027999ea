//! Result and error types for the core library

use thiserror::Error;

use super::migration::{Direction, MigrationId};

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Duplicate migration id {id}: {first} and {second}")]
    DuplicateIdentity {
        id: MigrationId,
        first: String,
        second: String,
    },

    #[error("Invalid migration source: {0}")]
    Definition(String),

    #[error("Invalid migration name: {0:?}")]
    NameInvalid(String),

    #[error("Migration {id}_{name} failed ({direction}): {cause}")]
    MigrationFailed {
        id: MigrationId,
        name: String,
        direction: Direction,
        cause: String,
    },

    #[error("Cannot roll back migration {id}: {reason}")]
    UnresolvableMigration { id: MigrationId, reason: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a store-unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attribute a failure inside a migration step to that migration.
    ///
    /// Cancellation and store outages keep their own kind so callers can
    /// tell them apart from a broken script.
    pub fn in_migration(self, id: MigrationId, name: &str, direction: Direction) -> Self {
        match self {
            Self::Cancelled(_) | Self::StoreUnavailable(_) | Self::MigrationFailed { .. } => self,
            other => Self::MigrationFailed {
                id,
                name: name.to_string(),
                direction,
                cause: other.to_string(),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<postgres::Error> for Error {
    fn from(e: postgres::Error) -> Self {
        if e.code() == Some(&postgres::error::SqlState::QUERY_CANCELED) {
            return Self::Cancelled(e.to_string());
        }
        if e.is_closed() {
            return Self::StoreUnavailable(e.to_string());
        }
        Self::Database(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
