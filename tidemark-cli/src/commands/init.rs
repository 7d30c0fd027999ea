//! Init command - create the ledger tables

use anyhow::{Context, Result};
use tidemark_core::open_store;
use tidemark_core::services::LogEvent;

use super::{failure_event, get_logger, load_config, log_event, GlobalOpts};
use crate::output;

pub fn run(opts: &GlobalOpts) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("init"));

    let config = load_config(opts)?;
    let store = open_store(&config).context("Failed to open migration store")?;

    if let Err(e) = store.ensure_schema() {
        log_event(&logger, failure_event("init_failed", "init", &e));
        return Err(e.into());
    }

    output::success("migration tables ready");
    Ok(())
}
