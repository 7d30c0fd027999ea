//! Ledger records: applied migrations and the groups they belong to

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::migration::MigrationId;

/// Identity of one `migrate` run; monotonic, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(i64);

impl GroupId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A migration recorded as applied in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub id: MigrationId,
    pub name: String,
    pub group_id: GroupId,
    pub applied_at: DateTime<Utc>,
    /// SHA-256 of the up script at apply time (empty for callbacks)
    pub checksum: String,
}

impl AppliedMigration {
    pub fn label(&self) -> String {
        format!("{}_{}", self.id, self.name)
    }
}

/// Migrations applied together by one `migrate` run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationGroup {
    pub id: GroupId,
    pub migrations: Vec<AppliedMigration>,
}

impl MigrationGroup {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            migrations: Vec::new(),
        }
    }
}

impl fmt::Display for MigrationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.migrations.iter().map(|m| m.label()).collect();
        write!(f, "group #{} ({})", self.id, labels.join(", "))
    }
}

/// Current unix time in milliseconds, the ledger's timestamp unit
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a ledger timestamp back to a UTC datetime
pub fn from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}
