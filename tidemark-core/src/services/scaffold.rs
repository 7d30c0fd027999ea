//! Scaffold service - creates new up/down migration file pairs

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::Serialize;

use crate::adapters::filesystem::{migration_file_name, DirectorySource};
use crate::domain::migration::SPLIT_MARKER;
use crate::domain::result::{Error, Result};
use crate::domain::{normalize_name, Direction, MigrationId};

/// Lock file guarding id selection in a migrations directory
const LOCK_FILE: &str = ".tidemark.lock";

/// A file written by the scaffolder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedFile {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScaffoldResult {
    pub id: MigrationId,
    pub name: String,
    pub up: CreatedFile,
    pub down: CreatedFile,
}

/// Creates migration file pairs in a directory
///
/// Never touches the database.
pub struct ScaffoldService {
    dir: PathBuf,
}

impl ScaffoldService {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create `<id>_<name>.up.sql` and `<id>_<name>.down.sql`
    pub fn create<S: AsRef<str>>(&self, words: &[S]) -> Result<ScaffoldResult> {
        self.create_at(words, Utc::now())
    }

    /// Same as [`create`](Self::create) with an explicit clock
    pub fn create_at<S: AsRef<str>>(&self, words: &[S], now: DateTime<Utc>) -> Result<ScaffoldResult> {
        let name = normalize_name(words)?;

        fs::create_dir_all(&self.dir)?;
        let lock = File::create(self.dir.join(LOCK_FILE))?;
        lock.lock_exclusive()?;

        let result = self.write_pair(&name, now);

        // Dropping the handle releases the lock as well
        let _ = lock.unlock();
        result
    }

    fn write_pair(&self, name: &str, now: DateTime<Utc>) -> Result<ScaffoldResult> {
        let id = self.next_id(now)?;
        let label = format!("{}_{}", id, name);

        let up = self.write_new(
            migration_file_name(id, name, Direction::Up),
            &format!(
                "-- {}: up\n-- Statements separated by a `{}` line run as separate batches.\n\n",
                label, SPLIT_MARKER
            ),
        )?;
        let down = match self.write_new(
            migration_file_name(id, name, Direction::Down),
            &format!("-- {}: down\n-- Leave empty to make rollback a no-op.\n\n", label),
        ) {
            Ok(down) => down,
            Err(e) => {
                // An up file without its down file would be irreversible
                let _ = fs::remove_file(&up.path);
                return Err(e);
            }
        };

        Ok(ScaffoldResult {
            id,
            name: name.to_string(),
            up,
            down,
        })
    }

    fn next_id(&self, now: DateTime<Utc>) -> Result<MigrationId> {
        let candidate = MigrationId::from_datetime(now);
        let on_disk = DirectorySource::new(&self.dir).file_ids()?.last().copied();

        match on_disk {
            Some(max) if candidate <= max => max.successor(),
            _ => Ok(candidate),
        }
    }

    fn write_new(&self, file_name: String, contents: &str) -> Result<CreatedFile> {
        let path = self.dir.join(&file_name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::Definition(format!(
                    "refusing to overwrite existing file {}",
                    path.display()
                )),
                _ => Error::Io(e),
            })?;
        file.write_all(contents.as_bytes())?;

        Ok(CreatedFile {
            name: file_name,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MigrationSource;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_creates_pair_with_timestamp_id() {
        let dir = tempdir().unwrap();
        let scaffold = ScaffoldService::new(dir.path().join("migrations"));

        let result = scaffold
            .create_at(&["add", "widgets"], at(2024, 3, 9, 14, 5, 7))
            .unwrap();

        assert_eq!(result.id, MigrationId::new(20240309140507));
        assert_eq!(result.name, "add_widgets");
        assert_eq!(result.up.name, "20240309140507_add_widgets.up.sql");
        assert_eq!(result.down.name, "20240309140507_add_widgets.down.sql");
        assert!(result.up.path.exists());
        assert!(result.down.path.exists());

        // The fresh pair loads, and its down script is an empty action
        let migrations = DirectorySource::new(scaffold.dir()).load().unwrap();
        assert_eq!(migrations.len(), 1);
        assert!(migrations[0].is_reversible());
    }

    #[test]
    fn test_same_second_gets_successor_id() {
        let dir = tempdir().unwrap();
        let scaffold = ScaffoldService::new(dir.path());
        let now = at(2024, 3, 9, 14, 5, 7);

        let first = scaffold.create_at(&["a"], now).unwrap();
        let second = scaffold.create_at(&["b"], now).unwrap();

        assert_eq!(second.id, first.id.successor().unwrap());
    }

    #[test]
    fn test_clock_behind_existing_ids() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("20300101000000_future.up.sql"), "SELECT 1").unwrap();
        let scaffold = ScaffoldService::new(dir.path());

        let result = scaffold.create_at(&["later"], at(2024, 1, 1, 0, 0, 0)).unwrap();
        assert_eq!(result.id, MigrationId::new(20300101000001));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let dir = tempdir().unwrap();
        let scaffold = ScaffoldService::new(dir.path().join("migrations"));

        let result = scaffold.create(&["--", "  "]);
        assert!(matches!(result, Err(Error::NameInvalid(_))));
        assert!(!dir.path().join("migrations").exists());
    }
}
