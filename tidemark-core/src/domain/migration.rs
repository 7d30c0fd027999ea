//! Migration definitions
//!
//! A migration is an immutable description of one schema change: an
//! identity, a name, an up action and an optional down action.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::result::{Error, Result};
use crate::ports::Statements;

/// Marker line that splits a SQL script into separately executed parts
pub const SPLIT_MARKER: &str = "--tidemark:split";

/// Timestamp layout used for generated migration ids
const ID_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Migration identity, ordered numerically
///
/// Generated ids are UTC timestamps (`YYYYMMDDHHMMSS`), but any integer up
/// to [`MigrationId::MAX`] is accepted so hand-written sources can use plain
/// counters. The ledger stores ids in BIGINT columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationId(u64);

impl MigrationId {
    /// Largest id a BIGINT ledger column can hold
    pub const MAX: u64 = i64::MAX as u64;

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Id derived from a wall-clock time
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        // %Y%m%d%H%M%S is always 14 ASCII digits for years 1000..=9999
        let digits = at.format(ID_TIMESTAMP_FORMAT).to_string();
        Self(digits.parse().unwrap_or_default())
    }

    /// The smallest id strictly greater than this one
    pub fn successor(&self) -> Result<Self> {
        self.0
            .checked_add(1)
            .filter(|next| *next <= Self::MAX)
            .map(Self)
            .ok_or_else(|| Error::Definition(format!("no migration id follows {}", self.0)))
    }

    /// Stored form in the ledger (BIGINT columns)
    pub fn as_i64(&self) -> Result<i64> {
        i64::try_from(self.0).map_err(|_| {
            Error::Definition(format!("migration id {} exceeds {}", self.0, Self::MAX))
        })
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        u64::try_from(value)
            .map(Self)
            .map_err(|_| Error::database(format!("ledger holds negative migration id {}", value)))
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MigrationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>()
            .ok()
            .filter(|id| *id <= Self::MAX)
            .map(Self)
            .ok_or_else(|| Error::Definition(format!("not a migration id: {}", s)))
    }
}

/// Which way a migration is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Programmatic migration body
pub type MigrationFn = dyn Fn(&mut dyn Statements) -> Result<()> + Send + Sync;

/// What a migration does when run in one direction
#[derive(Clone)]
pub enum MigrationAction {
    /// SQL script, optionally split into parts with [`SPLIT_MARKER`]
    Sql(String),
    /// Rust callback run against the open transaction
    Func(Arc<MigrationFn>),
}

impl MigrationAction {
    pub fn sql(script: impl Into<String>) -> Self {
        Self::Sql(script.into())
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&mut dyn Statements) -> Result<()> + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }

    /// Run the action inside an open transaction
    pub fn run(&self, statements: &mut dyn Statements) -> Result<()> {
        match self {
            MigrationAction::Sql(script) => {
                for part in split_script(script) {
                    statements.execute_batch(part)?;
                }
                Ok(())
            }
            MigrationAction::Func(f) => f(statements),
        }
    }

    /// SHA-256 of the script text; callbacks have no stable content and
    /// report an empty checksum
    pub fn checksum(&self) -> String {
        match self {
            MigrationAction::Sql(script) => hex::encode(Sha256::digest(script.as_bytes())),
            MigrationAction::Func(_) => String::new(),
        }
    }
}

impl fmt::Debug for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationAction::Sql(script) => f.debug_tuple("Sql").field(&script.len()).finish(),
            MigrationAction::Func(_) => f.write_str("Func"),
        }
    }
}

/// Split a script on marker lines, dropping parts with no statements
pub fn split_script(script: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in script.split_inclusive('\n') {
        if line.trim() == SPLIT_MARKER {
            parts.push(&script[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    parts.push(&script[start..]);

    parts.into_iter().filter(|p| has_statements(p)).collect()
}

/// True if the text has anything besides blank lines and `--` comments
fn has_statements(sql: &str) -> bool {
    sql.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with("--")
    })
}

/// One schema change
#[derive(Debug, Clone)]
pub struct Migration {
    pub id: MigrationId,
    pub name: String,
    pub up: MigrationAction,
    /// `None` marks the migration irreversible
    pub down: Option<MigrationAction>,
}

impl Migration {
    pub fn new(id: MigrationId, name: impl Into<String>, up: MigrationAction) -> Self {
        Self {
            id,
            name: name.into(),
            up,
            down: None,
        }
    }

    pub fn with_down(mut self, down: MigrationAction) -> Self {
        self.down = Some(down);
        self
    }

    /// `<id>_<name>`, the stem shared by the migration's files
    pub fn label(&self) -> String {
        format!("{}_{}", self.id, self.name)
    }

    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    pub fn checksum(&self) -> String {
        self.up.checksum()
    }
}

/// Normalize caller-supplied name words into a migration name
///
/// Words are joined with `_`, lowercased, and every run of characters
/// outside `[a-z0-9]` collapses into a single `_`.
pub fn normalize_name<S: AsRef<str>>(words: &[S]) -> Result<String> {
    let joined = words
        .iter()
        .map(|w| w.as_ref())
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();

    let mut name = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    let name = name.trim_matches('_').to_string();

    if name.is_empty() {
        return Err(Error::NameInvalid(joined));
    }
    Ok(name)
}
