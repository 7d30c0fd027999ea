//! DuckDB migration store

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use duckdb::{params, Connection};

use super::ledger_sql::LedgerSql;
use crate::config::LedgerTables;
use crate::domain::group::{from_ms, now_ms};
use crate::domain::result::{Error, Result};
use crate::domain::{AppliedMigration, GroupId, Migration, MigrationId, RunContext};
use crate::ports::{MigrationStore, Statements, StoreTransaction, TransactionWork};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
pub(crate) fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// Migration ledger in a DuckDB database
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    sql: LedgerSql,
}

impl DuckDbStore {
    /// Open (or create) a DuckDB database file
    ///
    /// Opening retries with exponential backoff on file locking errors,
    /// which show up when another process is briefly holding the file.
    /// Every other failure is reported as `StoreUnavailable` straight away.
    pub fn open(db_path: &Path, tables: &LedgerTables) -> Result<Self> {
        tables.validate()?;
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                        sql: LedgerSql::new(tables),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[tidemark] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(err_msg);
                        continue;
                    }
                    return Err(Error::store_unavailable(format!(
                        "{}: {}",
                        db_path.display(),
                        err_msg
                    )));
                }
            }
        }

        Err(Error::store_unavailable(last_error.unwrap_or_else(|| {
            format!("failed to open database after {} retries", MAX_RETRIES)
        })))
    }

    /// In-memory database, gone when the store is dropped
    pub fn open_in_memory(tables: &LedgerTables) -> Result<Self> {
        tables.validate()?;
        let config = duckdb::Config::default()
            .enable_autoload_extension(false)
            .map_err(|e| Error::store_unavailable(e.to_string()))?;
        let conn = Connection::open_in_memory_with_flags(config)
            .map_err(|e| Error::store_unavailable(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
            sql: LedgerSql::new(tables),
        })
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading stays off; the ledger needs none and cached
        // extensions can fail code-signing checks on macOS
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Run `f` against the underlying connection
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Path of the database file (`None` for in-memory stores)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if a table exists in the main schema
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = current_schema() AND table_name = $1",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn query_applied(
        conn: &Connection,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
    ) -> Result<Vec<AppliedMigration>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, name, group_id, applied_at, checksum)| -> Result<AppliedMigration> {
                Ok(AppliedMigration {
                    id: MigrationId::from_i64(id)?,
                    name,
                    group_id: GroupId::new(group_id),
                    applied_at: from_ms(applied_at),
                    checksum,
                })
            })
            .collect()
    }
}

impl MigrationStore for DuckDbStore {
    fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::store_unavailable(e.to_string()))?;
        tx.execute_batch(&self.sql.create_tables())
            .map_err(|e| Error::store_unavailable(format!("creating ledger tables: {}", e)))?;
        tx.commit()
            .map_err(|e| Error::store_unavailable(e.to_string()))?;
        Ok(())
    }

    fn schema_exists(&self) -> Result<bool> {
        let conn = self.lock()?;
        let (migrations, groups) = self.sql.table_names();
        let count: i64 = conn.query_row(self.sql.count_tables(), [migrations, groups], |row| {
            row.get(0)
        })?;
        Ok(count == 2)
    }

    fn applied(&self) -> Result<Vec<AppliedMigration>> {
        let conn = self.lock()?;
        Self::query_applied(&conn, &self.sql.select_applied(), &[])
    }

    fn open_group(&self) -> Result<GroupId> {
        let conn = self.lock()?;
        let id: i64 = conn.query_row(&self.sql.insert_group(), params![now_ms()], |row| {
            row.get(0)
        })?;
        Ok(GroupId::new(id))
    }

    fn close_group_if_empty(&self, group: GroupId) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(&self.sql.delete_group_if_empty(), params![group.value()])?;
        Ok(deleted > 0)
    }

    fn discard_empty_groups(&self) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(&self.sql.delete_empty_groups(), [])?)
    }

    fn last_group(&self) -> Result<Option<GroupId>> {
        let conn = self.lock()?;
        let id: Option<i64> = conn.query_row(&self.sql.select_last_group(), [], |row| row.get(0))?;
        Ok(id.map(GroupId::new))
    }

    fn members_of(&self, group: GroupId) -> Result<Vec<AppliedMigration>> {
        let conn = self.lock()?;
        Self::query_applied(&conn, &self.sql.select_members(), &[&group.value()])
    }

    fn delete_group(&self, group: GroupId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(&self.sql.delete_group(), params![group.value()])?;
        Ok(())
    }

    fn within_transaction(&self, ctx: &RunContext, work: &mut TransactionWork<'_>) -> Result<()> {
        ctx.check()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        {
            let mut handle = DuckDbTransaction { tx: &tx, sql: &self.sql };
            // Returning early drops `tx`, which rolls it back
            work(&mut handle)?;
        }

        ctx.check()?;
        tx.commit()?;
        Ok(())
    }
}

/// Open DuckDB transaction handed to migration actions
struct DuckDbTransaction<'a, 'conn> {
    tx: &'a duckdb::Transaction<'conn>,
    sql: &'a LedgerSql,
}

impl Statements for DuckDbTransaction<'_, '_> {
    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.tx.execute_batch(sql)?;
        Ok(())
    }
}

impl StoreTransaction for DuckDbTransaction<'_, '_> {
    fn statements(&mut self) -> &mut dyn Statements {
        self
    }

    fn record_applied(&mut self, group: GroupId, migration: &Migration) -> Result<()> {
        self.tx.execute(
            &self.sql.insert_applied(),
            params![
                migration.id.as_i64()?,
                &migration.name,
                group.value(),
                now_ms(),
                migration.checksum(),
            ],
        )?;
        Ok(())
    }

    fn remove_applied(&mut self, id: MigrationId) -> Result<()> {
        let removed = self.tx.execute(&self.sql.delete_applied(), params![id.as_i64()?])?;
        if removed == 0 {
            return Err(Error::database(format!("migration {} is not recorded as applied", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MigrationAction;

    fn store() -> DuckDbStore {
        let store = DuckDbStore::open_in_memory(&LedgerTables::default()).unwrap();
        store.ensure_schema().unwrap();
        store
    }

    fn migration(id: u64, name: &str, sql: &str) -> Migration {
        Migration::new(MigrationId::new(id), name, MigrationAction::sql(sql))
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let store = DuckDbStore::open_in_memory(&LedgerTables::default()).unwrap();
        assert!(!store.schema_exists().unwrap());

        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();

        assert!(store.schema_exists().unwrap());
        assert!(store.table_exists("tidemark_migrations").unwrap());
        assert!(store.table_exists("tidemark_migration_groups").unwrap());
    }

    #[test]
    fn test_group_ids_are_monotonic() {
        let store = store();
        let g1 = store.open_group().unwrap();
        let g2 = store.open_group().unwrap();
        assert_eq!(g1, GroupId::new(1));
        assert_eq!(g2, GroupId::new(2));
    }

    #[test]
    fn test_empty_group_is_discarded() {
        let store = store();
        let group = store.open_group().unwrap();
        assert!(store.close_group_if_empty(group).unwrap());
        assert_eq!(store.last_group().unwrap(), None);
    }

    #[test]
    fn test_transaction_commits_statements_and_ledger_together() {
        let store = store();
        let group = store.open_group().unwrap();
        let m = migration(1, "create_users", "CREATE TABLE users (id INTEGER)");

        store
            .within_transaction(&RunContext::new(), &mut |tx| {
                m.up.run(tx.statements())?;
                tx.record_applied(group, &m)
            })
            .unwrap();

        assert!(store.table_exists("users").unwrap());
        let applied = store.applied().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].id, m.id);
        assert_eq!(applied[0].group_id, group);
        assert_eq!(applied[0].checksum, m.checksum());
        assert!(!store.close_group_if_empty(group).unwrap());
        assert_eq!(store.last_group().unwrap(), Some(group));
    }

    #[test]
    fn test_failed_work_rolls_back() {
        let store = store();
        let group = store.open_group().unwrap();
        let m = migration(1, "broken", "CREATE TABLE widgets (id INTEGER); SELEC 1;");

        let result = store.within_transaction(&RunContext::new(), &mut |tx| {
            m.up.run(tx.statements())?;
            tx.record_applied(group, &m)
        });

        assert!(result.is_err());
        assert!(!store.table_exists("widgets").unwrap());
        assert!(store.applied().unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_context_rolls_back_before_commit() {
        let store = store();
        let group = store.open_group().unwrap();
        let m = migration(1, "create_users", "CREATE TABLE users (id INTEGER)");
        let ctx = RunContext::new();

        let result = store.within_transaction(&ctx, &mut |tx| {
            m.up.run(tx.statements())?;
            tx.record_applied(group, &m)?;
            ctx.cancel();
            Ok(())
        });

        assert!(result.unwrap_err().is_cancelled());
        assert!(!store.table_exists("users").unwrap());
        assert!(store.applied().unwrap().is_empty());
    }

    #[test]
    fn test_remove_applied_requires_a_record() {
        let store = store();
        let result = store.within_transaction(&RunContext::new(), &mut |tx| {
            tx.remove_applied(MigrationId::new(42))
        });
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[test]
    fn test_discard_empty_groups() {
        let store = store();
        store.open_group().unwrap();
        store.open_group().unwrap();
        assert_eq!(store.discard_empty_groups().unwrap(), 2);
    }

    #[test]
    fn test_open_missing_directory_is_store_unavailable() {
        let result = DuckDbStore::open(
            Path::new("/nonexistent/dir/for/tidemark/test.duckdb"),
            &LedgerTables::default(),
        );
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn test_retryable_error_detection() {
        assert!(is_retryable_error(
            "The process cannot access the file because it is being used by another process"
        ));
        assert!(is_retryable_error("IO Error: Could not set lock on file \"x.duckdb\""));
        assert!(!is_retryable_error("Permission denied"));
    }
}
