//! Status service - merged view of definitions and the ledger

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{AppliedMigration, GroupId, MigrationId};
use crate::ports::MigrationStore;
use crate::services::Registry;

/// Status service for the migration ledger
pub struct StatusService {
    registry: Arc<Registry>,
    store: Arc<dyn MigrationStore>,
}

impl StatusService {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn MigrationStore>) -> Self {
        Self { registry, store }
    }

    /// Build the status report
    ///
    /// Read-only: a database without ledger tables reports every migration
    /// as unapplied and is left untouched.
    pub fn report(&self) -> Result<StatusReport> {
        let (applied, last_group) = if self.store.schema_exists()? {
            (self.store.applied()?, self.store.last_group()?)
        } else {
            (Vec::new(), None)
        };

        let mut by_id: HashMap<MigrationId, AppliedMigration> =
            applied.into_iter().map(|m| (m.id, m)).collect();

        let migrations = self
            .registry
            .migrations()
            .iter()
            .map(|migration| {
                let record = by_id.remove(&migration.id);
                let modified = record.as_ref().is_some_and(|r| {
                    !r.checksum.is_empty() && r.checksum != migration.checksum()
                });
                MigrationStatus {
                    id: migration.id,
                    name: migration.name.clone(),
                    applied_at: record.as_ref().map(|r| r.applied_at),
                    group_id: record.as_ref().map(|r| r.group_id),
                    reversible: migration.is_reversible(),
                    modified,
                }
            })
            .collect();

        // Whatever is left was applied but has no definition any more
        let mut missing: Vec<AppliedMigration> = by_id.into_values().collect();
        missing.sort_by_key(|m| m.id);

        Ok(StatusReport {
            migrations,
            last_group,
            missing,
        })
    }
}

/// One known migration and its ledger state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub id: MigrationId,
    pub name: String,
    pub applied_at: Option<DateTime<Utc>>,
    pub group_id: Option<GroupId>,
    pub reversible: bool,
    /// The up script changed since it was applied
    pub modified: bool,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }

    pub fn label(&self) -> String {
        format!("{}_{}", self.id, self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Every known migration, ascending by id
    pub migrations: Vec<MigrationStatus>,
    pub last_group: Option<GroupId>,
    /// Applied records with no matching definition
    pub missing: Vec<AppliedMigration>,
}

impl StatusReport {
    pub fn applied(&self) -> Vec<&MigrationStatus> {
        self.migrations.iter().filter(|m| m.is_applied()).collect()
    }

    pub fn unapplied(&self) -> Vec<&MigrationStatus> {
        self.migrations.iter().filter(|m| !m.is_applied()).collect()
    }

    pub fn modified(&self) -> Vec<&MigrationStatus> {
        self.migrations.iter().filter(|m| m.modified).collect()
    }
}
