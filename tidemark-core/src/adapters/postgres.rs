//! PostgreSQL migration store

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use postgres::config::SslMode;
use postgres::{Client, NoTls, Row};

use super::ledger_sql::LedgerSql;
use crate::config::{LedgerTables, PostgresSettings};
use crate::domain::group::{from_ms, now_ms};
use crate::domain::result::{Error, Result};
use crate::domain::{AppliedMigration, GroupId, Migration, MigrationId, RunContext};
use crate::ports::{MigrationStore, Statements, StoreTransaction, TransactionWork};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Migration ledger in a PostgreSQL database
pub struct PostgresStore {
    client: Mutex<Client>,
    sql: LedgerSql,
}

impl PostgresStore {
    /// Connect with the configured parameters
    ///
    /// TLS is not negotiated; outside production `sslmode=disable` is sent
    /// explicitly, in production the server may still accept a plain
    /// connection under `sslmode=prefer`.
    pub fn connect(settings: &PostgresSettings, tables: &LedgerTables) -> Result<Self> {
        tables.validate()?;
        let ssl_mode = if settings.disable_tls {
            SslMode::Disable
        } else {
            SslMode::Prefer
        };

        let client = postgres::Config::new()
            .host(&settings.host)
            .port(settings.port)
            .user(&settings.user)
            .password(&settings.password)
            .dbname(&settings.dbname)
            .ssl_mode(ssl_mode)
            .connect_timeout(CONNECT_TIMEOUT)
            .application_name("tidemark")
            .connect(NoTls)
            .map_err(|e| {
                Error::store_unavailable(format!("{}: {}", settings.redacted_dsn(), e))
            })?;

        Ok(Self {
            client: Mutex::new(client),
            sql: LedgerSql::new(tables),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Client>> {
        self.client
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }
}

fn row_to_applied(row: &Row) -> Result<AppliedMigration> {
    Ok(AppliedMigration {
        id: MigrationId::from_i64(row.get(0))?,
        name: row.get(1),
        group_id: GroupId::new(row.get(2)),
        applied_at: from_ms(row.get(3)),
        checksum: row.get(4),
    })
}

impl MigrationStore for PostgresStore {
    fn ensure_schema(&self) -> Result<()> {
        let mut client = self.lock()?;
        let mut tx = client
            .transaction()
            .map_err(|e| Error::store_unavailable(e.to_string()))?;
        tx.batch_execute(&self.sql.create_tables())
            .map_err(|e| Error::store_unavailable(format!("creating ledger tables: {}", e)))?;
        tx.commit()
            .map_err(|e| Error::store_unavailable(e.to_string()))?;
        Ok(())
    }

    fn schema_exists(&self) -> Result<bool> {
        let mut client = self.lock()?;
        let (migrations, groups) = self.sql.table_names();
        let row = client.query_one(self.sql.count_tables(), &[&migrations, &groups])?;
        let count: i64 = row.get(0);
        Ok(count == 2)
    }

    fn applied(&self) -> Result<Vec<AppliedMigration>> {
        let mut client = self.lock()?;
        let rows = client.query(&self.sql.select_applied(), &[])?;
        rows.iter().map(row_to_applied).collect()
    }

    fn open_group(&self) -> Result<GroupId> {
        let mut client = self.lock()?;
        let row = client.query_one(&self.sql.insert_group(), &[&now_ms()])?;
        Ok(GroupId::new(row.get(0)))
    }

    fn close_group_if_empty(&self, group: GroupId) -> Result<bool> {
        let mut client = self.lock()?;
        let deleted = client.execute(&self.sql.delete_group_if_empty(), &[&group.value()])?;
        Ok(deleted > 0)
    }

    fn discard_empty_groups(&self) -> Result<usize> {
        let mut client = self.lock()?;
        let deleted = client.execute(&self.sql.delete_empty_groups(), &[])?;
        Ok(deleted as usize)
    }

    fn last_group(&self) -> Result<Option<GroupId>> {
        let mut client = self.lock()?;
        let row = client.query_one(&self.sql.select_last_group(), &[])?;
        let id: Option<i64> = row.get(0);
        Ok(id.map(GroupId::new))
    }

    fn members_of(&self, group: GroupId) -> Result<Vec<AppliedMigration>> {
        let mut client = self.lock()?;
        let rows = client.query(&self.sql.select_members(), &[&group.value()])?;
        rows.iter().map(row_to_applied).collect()
    }

    fn delete_group(&self, group: GroupId) -> Result<()> {
        let mut client = self.lock()?;
        client.execute(&self.sql.delete_group(), &[&group.value()])?;
        Ok(())
    }

    fn within_transaction(&self, ctx: &RunContext, work: &mut TransactionWork<'_>) -> Result<()> {
        ctx.check()?;
        let mut client = self.lock()?;
        let mut tx = client.transaction()?;

        // Let the server abort a statement that outlives the deadline
        if let Some(remaining) = ctx.remaining() {
            let ms = remaining.as_millis().max(1);
            tx.batch_execute(&format!("SET LOCAL statement_timeout = {}", ms))?;
        }

        {
            let mut handle = PostgresTransaction {
                tx: &mut tx,
                sql: &self.sql,
            };
            // Returning early drops `tx`, which rolls it back
            work(&mut handle)?;
        }

        ctx.check()?;
        tx.commit()?;
        Ok(())
    }
}

/// Open PostgreSQL transaction handed to migration actions
struct PostgresTransaction<'a, 'conn> {
    tx: &'a mut postgres::Transaction<'conn>,
    sql: &'a LedgerSql,
}

impl Statements for PostgresTransaction<'_, '_> {
    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.tx.batch_execute(sql)?;
        Ok(())
    }
}

impl StoreTransaction for PostgresTransaction<'_, '_> {
    fn statements(&mut self) -> &mut dyn Statements {
        self
    }

    fn record_applied(&mut self, group: GroupId, migration: &Migration) -> Result<()> {
        let id = migration.id.as_i64()?;
        let checksum = migration.checksum();
        self.tx.execute(
            &self.sql.insert_applied(),
            &[
                &id,
                &migration.name,
                &group.value(),
                &now_ms(),
                &checksum,
            ],
        )?;
        Ok(())
    }

    fn remove_applied(&mut self, id: MigrationId) -> Result<()> {
        let id_value = id.as_i64()?;
        let removed = self.tx.execute(&self.sql.delete_applied(), &[&id_value])?;
        if removed == 0 {
            return Err(Error::database(format!("migration {} is not recorded as applied", id)));
        }
        Ok(())
    }
}
