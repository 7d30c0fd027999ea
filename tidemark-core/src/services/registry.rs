//! Migration registry - every known migration, ordered by id

use crate::domain::result::{Error, Result};
use crate::domain::{Migration, MigrationId};
use crate::ports::MigrationSource;

/// Ordered, duplicate-free set of migration definitions
///
/// Built once per process and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    migrations: Vec<Migration>,
}

impl Registry {
    /// Load and validate definitions from a source
    pub fn load(source: &dyn MigrationSource) -> Result<Self> {
        Self::from_migrations(source.load()?)
    }

    pub fn from_migrations(mut migrations: Vec<Migration>) -> Result<Self> {
        migrations.sort_by_key(|m| m.id);

        if let Some(last) = migrations.last() {
            if last.id.value() > MigrationId::MAX {
                return Err(Error::Definition(format!(
                    "migration {} has an id above {}",
                    last.label(),
                    MigrationId::MAX
                )));
            }
        }

        for pair in migrations.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(Error::DuplicateIdentity {
                    id: pair[0].id,
                    first: pair[0].label(),
                    second: pair[1].label(),
                });
            }
        }

        Ok(Self { migrations })
    }

    /// All migrations, ascending by id
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn get(&self, id: MigrationId) -> Option<&Migration> {
        self.migrations
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|i| &self.migrations[i])
    }

    pub fn max_id(&self) -> Option<MigrationId> {
        self.migrations.last().map(|m| m.id)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MigrationAction;

    fn migration(id: u64, name: &str) -> Migration {
        Migration::new(MigrationId::new(id), name, MigrationAction::sql("SELECT 1"))
    }

    #[test]
    fn test_sorted_by_id() {
        let registry = Registry::from_migrations(vec![
            migration(30, "c"),
            migration(10, "a"),
            migration(20, "b"),
        ])
        .unwrap();

        let names: Vec<&str> = registry.migrations().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(registry.max_id(), Some(MigrationId::new(30)));
        assert_eq!(registry.get(MigrationId::new(20)).unwrap().name, "b");
        assert!(registry.get(MigrationId::new(25)).is_none());
    }

    #[test]
    fn test_duplicate_ids_are_fatal() {
        let result = Registry::from_migrations(vec![migration(1, "a"), migration(1, "b")]);
        match result {
            Err(Error::DuplicateIdentity { id, first, second }) => {
                assert_eq!(id, MigrationId::new(1));
                assert_eq!(first, "1_a");
                assert_eq!(second, "1_b");
            }
            other => panic!("expected DuplicateIdentity, got {:?}", other),
        }
    }

    #[test]
    fn test_ids_beyond_bigint_are_rejected() {
        let result = Registry::from_migrations(vec![
            migration(1, "a"),
            migration(10_000_000_000_000_000_000, "too_big"),
        ]);
        assert!(matches!(result, Err(Error::Definition(_))));

        let at_limit = Registry::from_migrations(vec![migration(MigrationId::MAX, "last")]);
        assert!(at_limit.is_ok());
    }

    #[test]
    fn test_load_from_source() {
        let registry = Registry::load(&vec![migration(2, "b"), migration(1, "a")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
