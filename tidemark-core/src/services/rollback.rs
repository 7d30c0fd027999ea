//! Rollback service - reverts the most recent migration group

use std::sync::Arc;

use crate::domain::result::{Error, Result};
use crate::domain::{AppliedMigration, Direction, MigrationAction, MigrationGroup, RunContext};
use crate::ports::MigrationStore;
use crate::services::Registry;

/// Service that reverts the last applied group
pub struct RollbackService {
    registry: Arc<Registry>,
    store: Arc<dyn MigrationStore>,
}

impl RollbackService {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn MigrationStore>) -> Self {
        Self { registry, store }
    }

    /// Revert every member of the newest group, newest migration first
    ///
    /// Returns `None` when there is no group to revert. Every member must
    /// have a down action before anything runs; a failure part way leaves
    /// the group in place with its unreverted members.
    pub fn rollback(&self, ctx: &RunContext) -> Result<Option<MigrationGroup>> {
        ctx.check()?;
        if !self.store.schema_exists()? {
            return Ok(None);
        }
        let Some(group_id) = self.store.last_group()? else {
            return Ok(None);
        };

        let mut members = self.store.members_of(group_id)?;
        members.sort_by(|a, b| b.id.cmp(&a.id));

        let steps = members
            .iter()
            .map(|applied| self.resolve_down(applied).map(|down| (applied, down)))
            .collect::<Result<Vec<_>>>()?;

        for (applied, down) in &steps {
            self.store
                .within_transaction(ctx, &mut |tx| {
                    down.run(tx.statements())?;
                    tx.remove_applied(applied.id)
                })
                .map_err(|e| e.in_migration(applied.id, &applied.name, Direction::Down))?;
        }

        self.store.delete_group(group_id)?;

        Ok(Some(MigrationGroup {
            id: group_id,
            migrations: members,
        }))
    }

    fn resolve_down(&self, applied: &AppliedMigration) -> Result<&MigrationAction> {
        let migration = self.registry.get(applied.id).ok_or_else(|| {
            Error::UnresolvableMigration {
                id: applied.id,
                reason: format!("no definition found for {}", applied.label()),
            }
        })?;

        migration
            .down
            .as_ref()
            .ok_or_else(|| Error::UnresolvableMigration {
                id: applied.id,
                reason: format!("{} has no down action", migration.label()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DuckDbStore;
    use crate::config::LedgerTables;
    use crate::domain::{GroupId, Migration, MigrationId};
    use crate::services::MigrateService;

    fn reversible(id: u64, table: &str) -> Migration {
        Migration::new(
            MigrationId::new(id),
            format!("create_{}", table),
            MigrationAction::sql(format!("CREATE TABLE {} (id INTEGER)", table)),
        )
        .with_down(MigrationAction::sql(format!("DROP TABLE {}", table)))
    }

    struct Fixture {
        store: Arc<DuckDbStore>,
        migrate: MigrateService,
        rollback: RollbackService,
    }

    fn fixture(migrations: Vec<Migration>) -> Fixture {
        let store = Arc::new(DuckDbStore::open_in_memory(&LedgerTables::default()).unwrap());
        let registry = Arc::new(Registry::from_migrations(migrations).unwrap());
        Fixture {
            migrate: MigrateService::new(Arc::clone(&registry), store.clone()),
            rollback: RollbackService::new(registry, store.clone()),
            store,
        }
    }

    #[test]
    fn test_nothing_to_roll_back() {
        let f = fixture(vec![reversible(1, "a")]);
        // No ledger yet, and it must not be created
        assert_eq!(f.rollback.rollback(&RunContext::new()).unwrap(), None);
        assert!(!f.store.schema_exists().unwrap());

        f.migrate.init().unwrap();
        assert_eq!(f.rollback.rollback(&RunContext::new()).unwrap(), None);
    }

    #[test]
    fn test_reverts_newest_group_in_descending_order() {
        let first = fixture(vec![reversible(1, "a")]);
        first.migrate.migrate(&RunContext::new()).unwrap();

        // Two more migrations show up before the next run
        let store = first.store;
        let registry = Arc::new(
            Registry::from_migrations(vec![reversible(1, "a"), reversible(2, "b"), reversible(3, "c")])
                .unwrap(),
        );
        let migrate = MigrateService::new(Arc::clone(&registry), store.clone());
        let rollback = RollbackService::new(registry, store.clone());

        let second = migrate.migrate(&RunContext::new()).unwrap().unwrap();
        assert_eq!(second.id, GroupId::new(2));

        let reverted = rollback.rollback(&RunContext::new()).unwrap().unwrap();
        assert_eq!(reverted.id, GroupId::new(2));
        let ids: Vec<u64> = reverted.migrations.iter().map(|m| m.id.value()).collect();
        assert_eq!(ids, vec![3, 2]);

        assert!(store.table_exists("a").unwrap());
        assert!(!store.table_exists("b").unwrap());
        assert!(!store.table_exists("c").unwrap());
        assert_eq!(store.last_group().unwrap(), Some(GroupId::new(1)));
    }

    #[test]
    fn test_missing_down_action_reverts_nothing() {
        let f = fixture(vec![
            reversible(1, "a"),
            Migration::new(
                MigrationId::new(2),
                "create_b",
                MigrationAction::sql("CREATE TABLE b (id INTEGER)"),
            ),
            reversible(3, "c"),
        ]);
        f.migrate.migrate(&RunContext::new()).unwrap();

        let err = f.rollback.rollback(&RunContext::new()).unwrap_err();
        match err {
            Error::UnresolvableMigration { id, .. } => assert_eq!(id, MigrationId::new(2)),
            other => panic!("expected UnresolvableMigration, got {:?}", other),
        }

        // Migration 3 would have run first; it must still be applied
        assert!(f.store.table_exists("c").unwrap());
        assert_eq!(f.store.applied().unwrap().len(), 3);
    }

    #[test]
    fn test_applied_migration_without_definition_is_unresolvable() {
        let f = fixture(vec![reversible(1, "a")]);
        f.migrate.migrate(&RunContext::new()).unwrap();

        let rollback = RollbackService::new(Arc::new(Registry::default()), f.store.clone());
        assert!(matches!(
            rollback.rollback(&RunContext::new()),
            Err(Error::UnresolvableMigration { .. })
        ));
        assert!(f.store.table_exists("a").unwrap());
    }

    #[test]
    fn test_failed_down_keeps_group_and_remaining_members() {
        let f = fixture(vec![
            reversible(1, "a"),
            Migration::new(
                MigrationId::new(2),
                "create_b",
                MigrationAction::sql("CREATE TABLE b (id INTEGER)"),
            )
            .with_down(MigrationAction::sql("DROP TABLE no_such_table")),
            reversible(3, "c"),
        ]);
        f.migrate.migrate(&RunContext::new()).unwrap();

        let err = f.rollback.rollback(&RunContext::new()).unwrap_err();
        match err {
            Error::MigrationFailed { id, direction, .. } => {
                assert_eq!(id, MigrationId::new(2));
                assert_eq!(direction, Direction::Down);
            }
            other => panic!("expected MigrationFailed, got {:?}", other),
        }

        let remaining: Vec<u64> = f.store.applied().unwrap().iter().map(|m| m.id.value()).collect();
        assert_eq!(remaining, vec![1, 2]);
        assert_eq!(f.store.last_group().unwrap(), Some(GroupId::new(1)));
        assert!(!f.store.table_exists("c").unwrap());
    }

    #[test]
    fn test_empty_down_script_is_a_no_op() {
        let f = fixture(vec![Migration::new(
            MigrationId::new(1),
            "seed",
            MigrationAction::sql("CREATE TABLE a (id INTEGER)"),
        )
        .with_down(MigrationAction::sql("-- nothing to undo\n"))]);
        f.migrate.migrate(&RunContext::new()).unwrap();

        let reverted = f.rollback.rollback(&RunContext::new()).unwrap().unwrap();
        assert_eq!(reverted.migrations.len(), 1);
        assert!(f.store.applied().unwrap().is_empty());
        assert_eq!(f.store.last_group().unwrap(), None);
    }

    #[test]
    fn test_cancelled_rollback_reverts_nothing() {
        let f = fixture(vec![reversible(1, "a")]);
        f.migrate.migrate(&RunContext::new()).unwrap();

        let ctx = RunContext::new();
        ctx.cancel();
        assert!(f.rollback.rollback(&ctx).unwrap_err().is_cancelled());
        assert!(f.store.table_exists("a").unwrap());
    }
}
