//! Source port - where migration definitions come from

use crate::domain::result::Result;
use crate::domain::Migration;

/// Anything that can enumerate migration definitions
///
/// Order and uniqueness are not required here; the registry sorts and
/// rejects duplicate ids.
pub trait MigrationSource {
    fn load(&self) -> Result<Vec<Migration>>;
}

impl MigrationSource for Vec<Migration> {
    fn load(&self) -> Result<Vec<Migration>> {
        Ok(self.clone())
    }
}
