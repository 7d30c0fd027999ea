//! Migrate service - applies pending migrations as one group
//!
//! Each migration runs in its own transaction together with its ledger
//! record. A failure stops the run; migrations committed before it stay
//! applied and stay in the group, so the ledger always matches the
//! database.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::result::Result;
use crate::domain::{Direction, Migration, MigrationGroup, MigrationId, RunContext};
use crate::ports::MigrationStore;
use crate::services::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyMode {
    /// Run the up action, then record it
    Run,
    /// Record without running (adopting an existing schema)
    MarkOnly,
}

/// Service that applies pending migrations
pub struct MigrateService {
    registry: Arc<Registry>,
    store: Arc<dyn MigrationStore>,
}

impl MigrateService {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn MigrationStore>) -> Self {
        Self { registry, store }
    }

    /// Create the ledger tables (idempotent)
    pub fn init(&self) -> Result<()> {
        self.store.ensure_schema()
    }

    /// Migrations not yet recorded as applied, ascending by id
    pub fn pending(&self) -> Result<Vec<&Migration>> {
        let applied: HashSet<MigrationId> = if self.store.schema_exists()? {
            self.store.applied()?.into_iter().map(|m| m.id).collect()
        } else {
            HashSet::new()
        };

        Ok(self
            .registry
            .migrations()
            .iter()
            .filter(|m| !applied.contains(&m.id))
            .collect())
    }

    /// Apply every pending migration in one new group
    ///
    /// Returns `None` when nothing was pending.
    pub fn migrate(&self, ctx: &RunContext) -> Result<Option<MigrationGroup>> {
        self.run(ctx, ApplyMode::Run)
    }

    /// Record every pending migration in one new group without running it
    pub fn mark_applied(&self, ctx: &RunContext) -> Result<Option<MigrationGroup>> {
        self.run(ctx, ApplyMode::MarkOnly)
    }

    fn run(&self, ctx: &RunContext, mode: ApplyMode) -> Result<Option<MigrationGroup>> {
        ctx.check()?;
        self.store.ensure_schema()?;
        // Leftovers from a run that died before its first commit
        self.store.discard_empty_groups()?;

        let pending = self.pending()?;
        if pending.is_empty() {
            return Ok(None);
        }

        let group_id = self.store.open_group()?;

        for migration in pending {
            let result = self.store.within_transaction(ctx, &mut |tx| {
                if mode == ApplyMode::Run {
                    migration.up.run(tx.statements())?;
                }
                tx.record_applied(group_id, migration)
            });

            if let Err(e) = result {
                let err = e.in_migration(migration.id, &migration.name, Direction::Up);
                // A group nothing was committed to must not be persisted
                if let Err(close_err) = self.store.close_group_if_empty(group_id) {
                    eprintln!(
                        "[tidemark] Could not discard empty group #{}: {}",
                        group_id, close_err
                    );
                }
                return Err(err);
            }
        }

        Ok(Some(MigrationGroup {
            id: group_id,
            migrations: self.store.members_of(group_id)?,
        }))
    }
}
