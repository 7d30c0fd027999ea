//! Rollback command - revert the most recent migration group

use anyhow::Result;
use tidemark_core::services::LogEvent;

use super::{failure_event, get_context, get_logger, log_event, GlobalOpts};
use crate::output;

pub fn run(opts: &GlobalOpts) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("rollback"));

    let ctx = get_context(opts)?;

    match ctx.rollback_service.rollback(&ctx.run_context()) {
        Ok(None) => output::info("no groups to rollback"),
        Ok(Some(group)) => {
            log_event(
                &logger,
                LogEvent::new("rollback_completed")
                    .with_command("rollback")
                    .with_group(group.id),
            );
            output::success(&format!("rolled back {}", group));
        }
        Err(e) => {
            log_event(&logger, failure_event("rollback_failed", "rollback", &e));
            return Err(e.into());
        }
    }

    Ok(())
}
