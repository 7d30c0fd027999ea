//! Directory of SQL migration files
//!
//! Each migration is a pair of files sharing an `<id>_<name>` stem:
//! `20240101120000_create_users.up.sql` and
//! `20240101120000_create_users.down.sql`. A missing down file makes the
//! migration irreversible. Files that don't match the pattern are ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::result::{Error, Result};
use crate::domain::{Direction, Migration, MigrationAction, MigrationId};
use crate::ports::MigrationSource;

static FILE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)_([A-Za-z0-9_\-]+)\.(up|down)\.sql$").expect("valid file pattern")
});

/// File name for one side of a migration
pub fn migration_file_name(id: MigrationId, name: &str, direction: Direction) -> String {
    format!("{}_{}.{}.sql", id, name, direction)
}

/// Parse `<id>_<name>.<up|down>.sql`
///
/// `Ok(None)` for names that don't follow the pattern. A matching name whose
/// id doesn't fit the ledger is a `Definition` error.
pub fn parse_file_name(file_name: &str) -> Result<Option<(MigrationId, String, Direction)>> {
    let Some(caps) = FILE_PATTERN.captures(file_name) else {
        return Ok(None);
    };
    let id = caps[1]
        .parse::<MigrationId>()
        .map_err(|_| Error::Definition(format!("migration id out of range: {}", file_name)))?;
    let direction = if &caps[3] == "up" {
        Direction::Up
    } else {
        Direction::Down
    };
    Ok(Some((id, caps[2].to_string(), direction)))
}

fn parse_entry(entry: &fs::DirEntry) -> Result<Option<(MigrationId, String, Direction)>> {
    match entry.file_name().to_str() {
        Some(file_name) => parse_file_name(file_name),
        None => Ok(None),
    }
}

/// Loads migrations from a directory of `.sql` files
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

#[derive(Default)]
struct FilePair {
    up: Option<(String, PathBuf)>,
    down: Option<(String, PathBuf)>,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids of every migration file on disk, including unpaired ones
    pub fn file_ids(&self) -> Result<Vec<MigrationId>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some((id, _, _)) = parse_entry(&entry)? {
                ids.push(id);
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn scan(&self) -> Result<BTreeMap<MigrationId, FilePair>> {
        let mut pairs: BTreeMap<MigrationId, FilePair> = BTreeMap::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some((id, name, direction)) = parse_entry(&entry)? else {
                continue;
            };

            let pair = pairs.entry(id).or_default();
            let slot = match direction {
                Direction::Up => &mut pair.up,
                Direction::Down => &mut pair.down,
            };
            if let Some((_, existing)) = slot {
                return Err(Error::DuplicateIdentity {
                    id,
                    first: existing.display().to_string(),
                    second: path.display().to_string(),
                });
            }
            *slot = Some((name, path));
        }

        Ok(pairs)
    }
}

impl MigrationSource for DirectorySource {
    fn load(&self) -> Result<Vec<Migration>> {
        if !self.dir.is_dir() {
            return Err(Error::Definition(format!(
                "migrations directory not found: {}",
                self.dir.display()
            )));
        }

        let mut migrations = Vec::new();
        for (id, pair) in self.scan()? {
            let Some((name, up_path)) = pair.up else {
                let down_path = pair.down.map(|(_, p)| p.display().to_string());
                return Err(Error::Definition(format!(
                    "down script without an up script: {}",
                    down_path.unwrap_or_else(|| id.to_string())
                )));
            };

            let mut migration = Migration::new(
                id,
                name.clone(),
                MigrationAction::sql(fs::read_to_string(&up_path)?),
            );

            if let Some((down_name, down_path)) = pair.down {
                if down_name != name {
                    return Err(Error::Definition(format!(
                        "migration {} has up name {:?} but down name {:?}",
                        id, name, down_name
                    )));
                }
                migration.down = Some(MigrationAction::sql(fs::read_to_string(&down_path)?));
            }

            migrations.push(migration);
        }

        Ok(migrations)
    }
}
