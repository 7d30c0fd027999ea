//! Ledger SQL shared by the database adapters
//!
//! Statements use `$n` placeholders, which both DuckDB and PostgreSQL
//! accept. Table names come from validated config.

use crate::config::LedgerTables;

#[derive(Debug, Clone)]
pub struct LedgerSql {
    migrations: String,
    groups: String,
}

impl LedgerSql {
    pub fn new(tables: &LedgerTables) -> Self {
        Self {
            migrations: tables.migrations.clone(),
            groups: tables.groups.clone(),
        }
    }

    pub fn create_tables(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {m} (
                id BIGINT PRIMARY KEY,
                name VARCHAR NOT NULL,
                group_id BIGINT NOT NULL,
                applied_at BIGINT NOT NULL,
                checksum VARCHAR NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS {g} (
                id BIGINT PRIMARY KEY,
                created_at BIGINT NOT NULL
            );",
            m = self.migrations,
            g = self.groups
        )
    }

    /// Counts how many of the two ledger tables exist ($1, $2: table names)
    pub fn count_tables(&self) -> &'static str {
        "SELECT COUNT(*) FROM information_schema.tables
         WHERE table_schema = current_schema()
           AND lower(table_name) IN (lower($1), lower($2))"
    }

    pub fn table_names(&self) -> (&str, &str) {
        (&self.migrations, &self.groups)
    }

    pub fn select_applied(&self) -> String {
        format!(
            "SELECT id, name, group_id, applied_at, checksum FROM {} ORDER BY id",
            self.migrations
        )
    }

    pub fn select_members(&self) -> String {
        format!(
            "SELECT id, name, group_id, applied_at, checksum FROM {} WHERE group_id = $1 ORDER BY id",
            self.migrations
        )
    }

    pub fn insert_applied(&self) -> String {
        format!(
            "INSERT INTO {} (id, name, group_id, applied_at, checksum) VALUES ($1, $2, $3, $4, $5)",
            self.migrations
        )
    }

    pub fn delete_applied(&self) -> String {
        format!("DELETE FROM {} WHERE id = $1", self.migrations)
    }

    /// Next group id is one past the highest ever seen, in either table
    pub fn insert_group(&self) -> String {
        format!(
            "INSERT INTO {g} (id, created_at)
             SELECT GREATEST(
                 (SELECT COALESCE(MAX(id), 0) FROM {g}),
                 (SELECT COALESCE(MAX(group_id), 0) FROM {m})
             ) + 1, CAST($1 AS BIGINT)
             RETURNING id",
            g = self.groups,
            m = self.migrations
        )
    }

    pub fn delete_group_if_empty(&self) -> String {
        format!(
            "DELETE FROM {g} WHERE id = $1
             AND NOT EXISTS (SELECT 1 FROM {m} WHERE group_id = $1)",
            g = self.groups,
            m = self.migrations
        )
    }

    pub fn delete_empty_groups(&self) -> String {
        format!(
            "DELETE FROM {g} WHERE NOT EXISTS (SELECT 1 FROM {m} WHERE {m}.group_id = {g}.id)",
            g = self.groups,
            m = self.migrations
        )
    }

    pub fn select_last_group(&self) -> String {
        format!(
            "SELECT MAX(g.id) FROM {g} g WHERE EXISTS (SELECT 1 FROM {m} m WHERE m.group_id = g.id)",
            g = self.groups,
            m = self.migrations
        )
    }

    pub fn delete_group(&self) -> String {
        format!("DELETE FROM {} WHERE id = $1", self.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_use_configured_tables() {
        let sql = LedgerSql::new(&LedgerTables {
            migrations: "schema_log".into(),
            groups: "schema_batches".into(),
        });
        assert!(sql.create_tables().contains("CREATE TABLE IF NOT EXISTS schema_log"));
        assert!(sql.create_tables().contains("CREATE TABLE IF NOT EXISTS schema_batches"));
        assert!(sql.insert_applied().starts_with("INSERT INTO schema_log"));
        assert!(sql.select_last_group().contains("FROM schema_batches g"));
        assert_eq!(sql.table_names(), ("schema_log", "schema_batches"));
    }
}
