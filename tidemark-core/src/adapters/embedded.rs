//! Migrations compiled into the binary

use crate::domain::result::Result;
use crate::domain::{Migration, MigrationAction, MigrationId};
use crate::ports::MigrationSource;

/// One embedded migration, typically built with `include_str!`
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedMigration {
    pub id: u64,
    pub name: &'static str,
    pub up: &'static str,
    pub down: Option<&'static str>,
}

/// A static list of embedded migrations
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedSource(pub &'static [EmbeddedMigration]);

impl MigrationSource for EmbeddedSource {
    fn load(&self) -> Result<Vec<Migration>> {
        Ok(self
            .0
            .iter()
            .map(|m| {
                let migration =
                    Migration::new(MigrationId::new(m.id), m.name, MigrationAction::sql(m.up));
                match m.down {
                    Some(down) => migration.with_down(MigrationAction::sql(down)),
                    None => migration,
                }
            })
            .collect())
    }
}
