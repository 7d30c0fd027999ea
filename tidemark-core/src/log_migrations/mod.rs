//! Log database migrations - embedded SQL files
//!
//! The event log's schema is versioned with the same engine it records.
//! Scripts are compiled into the binary with `include_str!`.
//!
//! When adding a migration, create `NNN_description.up.sql` (and a
//! `.down.sql`) here and append an entry with the next id.

use crate::adapters::EmbeddedMigration;

pub const LOG_MIGRATIONS: &[EmbeddedMigration] = &[
    EmbeddedMigration {
        id: 1,
        name: "create_sys_logs",
        up: include_str!("001_create_sys_logs.up.sql"),
        down: Some(include_str!("001_create_sys_logs.down.sql")),
    },
    EmbeddedMigration {
        id: 2,
        name: "index_sys_logs",
        up: include_str!("002_index_sys_logs.up.sql"),
        down: Some(include_str!("002_index_sys_logs.down.sql")),
    },
];
