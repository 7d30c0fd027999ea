//! Store port - the migration ledger held in the target database

use crate::domain::result::Result;
use crate::domain::{AppliedMigration, GroupId, Migration, MigrationId, RunContext};

/// Statement execution inside an open transaction
///
/// This is all a migration action gets to see of the database.
pub trait Statements {
    /// Execute one or more statements, discarding any results
    fn execute_batch(&mut self, sql: &str) -> Result<()>;
}

/// One open store transaction: statements plus ledger writes that commit
/// or roll back together
pub trait StoreTransaction {
    fn statements(&mut self) -> &mut dyn Statements;

    /// Record `migration` as applied in `group`
    fn record_applied(&mut self, group: GroupId, migration: &Migration) -> Result<()>;

    /// Drop the applied record for `id`
    fn remove_applied(&mut self, id: MigrationId) -> Result<()>;
}

/// Unit of work run by [`MigrationStore::within_transaction`]
pub type TransactionWork<'a> = dyn FnMut(&mut dyn StoreTransaction) -> Result<()> + 'a;

/// Persistent ledger of applied migrations and migration groups
///
/// Implementations keep both tables in the database being migrated so
/// that ledger writes share a transaction with the schema change they
/// describe.
pub trait MigrationStore: Send + Sync {
    /// Create the ledger tables if absent (idempotent)
    fn ensure_schema(&self) -> Result<()>;

    /// Whether the ledger tables exist
    fn schema_exists(&self) -> Result<bool>;

    /// All applied migrations, ascending by id
    fn applied(&self) -> Result<Vec<AppliedMigration>>;

    /// Persist a new group and return its id
    fn open_group(&self) -> Result<GroupId>;

    /// Delete `group` if it has no members; returns whether it was deleted
    fn close_group_if_empty(&self, group: GroupId) -> Result<bool>;

    /// Delete every group without members; returns how many were removed
    fn discard_empty_groups(&self) -> Result<usize>;

    /// Newest group that has at least one member
    fn last_group(&self) -> Result<Option<GroupId>>;

    /// Members of `group`, ascending by id
    fn members_of(&self, group: GroupId) -> Result<Vec<AppliedMigration>>;

    fn delete_group(&self, group: GroupId) -> Result<()>;

    /// Run `work` in one database transaction
    ///
    /// Commits only when `work` succeeds and `ctx` is still live; any
    /// error, including cancellation, rolls the whole transaction back.
    fn within_transaction(&self, ctx: &RunContext, work: &mut TransactionWork<'_>) -> Result<()>;
}
