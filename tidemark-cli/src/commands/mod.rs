//! CLI command implementations

pub mod create;
pub mod init;
pub mod logs;
pub mod migrate;
pub mod rollback;
pub mod status;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tidemark_core::config::Config;
use tidemark_core::services::{LogEvent, LoggingService};
use tidemark_core::{Error, TidemarkContext};

/// Options shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOpts {
    pub dir: Option<PathBuf>,
    pub timeout: Option<u64>,
}

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    LoggingService::new(&get_state_dir(), env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Failure event carrying the migration the error names, if any
pub fn failure_event(event: &str, command: &str, err: &Error) -> LogEvent {
    let log_event = LogEvent::new(event)
        .with_command(command)
        .with_error(err.to_string());
    match err {
        Error::MigrationFailed { id, name, .. } => {
            log_event.with_migration(format!("{}_{}", id, name))
        }
        Error::UnresolvableMigration { id, .. } => log_event.with_migration(id.to_string()),
        _ => log_event,
    }
}

/// Get the state directory from environment or default
pub fn get_state_dir() -> PathBuf {
    if let Some(dir) = std::env::var("TIDEMARK_DIR").ok().filter(|d| !d.is_empty()) {
        PathBuf::from(dir)
    } else {
        dirs::home_dir()
            .map(|home| home.join(".tidemark"))
            .unwrap_or_else(|| PathBuf::from(".tidemark"))
    }
}

/// Load configuration for the current directory and apply CLI overrides
pub fn load_config(opts: &GlobalOpts) -> Result<Config> {
    let project_dir = std::env::current_dir().context("Failed to read current directory")?;
    let mut config = Config::load(&project_dir).context("Failed to load configuration")?;

    if let Some(dir) = &opts.dir {
        config = config.with_migrations_dir(project_dir.join(dir));
    }
    if let Some(secs) = opts.timeout {
        config.timeout = Some(Duration::from_secs(secs));
    }
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// Load migrations and open the configured store
pub fn get_context(opts: &GlobalOpts) -> Result<TidemarkContext> {
    let config = load_config(opts)?;
    TidemarkContext::new(config).context("Failed to initialize tidemark context")
}
