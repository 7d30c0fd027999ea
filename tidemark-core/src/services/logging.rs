//! Logging service - structured event logging to DuckDB
//!
//! Stores CLI events in `logs.duckdb` under the state directory. Only
//! command names, migration labels, group ids and error messages are
//! recorded; never SQL text or connection settings.
//!
//! The log database's schema is itself migrated by tidemark, from the
//! embedded list in `log_migrations`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use duckdb::params;
use serde::{Deserialize, Serialize};

use crate::adapters::{DuckDbStore, EmbeddedSource};
use crate::config::LedgerTables;
use crate::domain::group::now_ms;
use crate::domain::result::Result;
use crate::domain::{GroupId, RunContext};
use crate::log_migrations::LOG_MIGRATIONS;
use crate::services::{MigrateService, Registry};

/// File name of the log database inside the state directory
pub const LOG_DB_FILE: &str = "logs.duckdb";

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    let timestamp = now_ms().max(0) as u64;

    // Use lower 48 bits for timestamp (good for ~8900 years)
    // Use upper 16 bits for counter (65536 unique IDs per millisecond)
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

/// Detect the current platform
fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// A log event to be recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl LogEvent {
    /// Create a new log event with just an event name
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            command: None,
            migration: None,
            group_id: None,
            error_message: None,
            error_details: None,
        }
    }

    /// Set the command context
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Set the migration the event is about (`<id>_<name>`)
    pub fn with_migration(mut self, label: impl Into<String>) -> Self {
        self.migration = Some(label.into());
        self
    }

    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group_id = Some(group.value());
        self
    }

    /// Set error information
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Set error details (cause chain, additional context)
    pub fn with_error_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }
}

/// A log entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: i64,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub command: Option<String>,
    pub migration: Option<String>,
    pub group_id: Option<i64>,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
}

const SELECT_ENTRIES: &str = r#"
    SELECT id, timestamp, app_version, platform, event,
           command, migration, group_id, error_message, error_details
    FROM sys_logs
"#;

/// Service for structured event logging
pub struct LoggingService {
    store: Arc<DuckDbStore>,
    db_path: PathBuf,
    app_version: String,
    platform: &'static str,
}

impl LoggingService {
    /// Open or create `logs.duckdb` in the state directory and bring its
    /// schema up to date
    pub fn new(state_dir: &Path, app_version: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(state_dir)?;
        let db_path = state_dir.join(LOG_DB_FILE);

        let tables = LedgerTables::new("sys_migrations", "sys_migration_groups");
        let store = Arc::new(DuckDbStore::open(&db_path, &tables)?);

        let registry = Arc::new(Registry::load(&EmbeddedSource(LOG_MIGRATIONS))?);
        MigrateService::new(registry, store.clone()).migrate(&RunContext::new())?;

        Ok(Self {
            store,
            db_path,
            app_version: app_version.into(),
            platform: detect_platform(),
        })
    }

    /// Log an event
    ///
    /// The app version and platform are added from the service
    /// configuration.
    pub fn log(&self, event: LogEvent) -> Result<()> {
        self.store.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO sys_logs (
                    id, timestamp, app_version, platform, event,
                    command, migration, group_id, error_message, error_details
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    generate_id(),
                    now_ms(),
                    &self.app_version,
                    self.platform,
                    &event.event,
                    &event.command,
                    &event.migration,
                    &event.group_id,
                    &event.error_message,
                    &event.error_details,
                ],
            )?;
            Ok(())
        })
    }

    /// Log a CLI command execution
    pub fn log_command(&self, command: &str) -> Result<()> {
        self.log(LogEvent::new("command_executed").with_command(command))
    }

    /// Log an error
    pub fn log_error(&self, event: &str, message: &str, details: Option<&str>) -> Result<()> {
        let mut log_event = LogEvent::new(event).with_error(message);
        if let Some(d) = details {
            log_event = log_event.with_error_details(d);
        }
        self.log(log_event)
    }

    /// Most recent entries, newest first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query(&format!("{} ORDER BY timestamp DESC, id DESC LIMIT ?", SELECT_ENTRIES), limit)
    }

    /// Most recent entries that carry an error, newest first
    pub fn get_errors(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query(
            &format!(
                "{} WHERE error_message IS NOT NULL ORDER BY timestamp DESC, id DESC LIMIT ?",
                SELECT_ENTRIES
            ),
            limit,
        )
    }

    fn query(&self, sql: &str, limit: usize) -> Result<Vec<LogEntry>> {
        self.store.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let entries = stmt
                .query_map([limit as i64], |row| {
                    Ok(LogEntry {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                        app_version: row.get(2)?,
                        platform: row.get(3)?,
                        event: row.get(4)?,
                        command: row.get(5)?,
                        migration: row.get(6)?,
                        group_id: row.get(7)?,
                        error_message: row.get(8)?,
                        error_details: row.get(9)?,
                    })
                })?
                .collect::<duckdb::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }

    /// Get the total number of log entries
    pub fn count(&self) -> Result<u64> {
        self.store.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
    }

    /// Get the path to the logs database
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
