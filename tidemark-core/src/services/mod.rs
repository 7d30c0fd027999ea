//! Service layer - migration use cases
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on one command: migrate, rollback, status or scaffolding.

pub mod logging;
mod migrate;
mod registry;
mod rollback;
mod scaffold;
mod status;

pub use logging::{LogEntry, LogEvent, LoggingService};
pub use migrate::MigrateService;
pub use registry::Registry;
pub use rollback::RollbackService;
pub use scaffold::{CreatedFile, ScaffoldResult, ScaffoldService};
pub use status::{MigrationStatus, StatusReport, StatusService};
