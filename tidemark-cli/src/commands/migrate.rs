//! Migrate command - apply pending migrations as one group

use anyhow::Result;
use tidemark_core::services::LogEvent;
use tidemark_core::Error;

use super::{failure_event, get_context, get_logger, log_event, GlobalOpts};
use crate::output;

pub fn run(opts: &GlobalOpts, mark_applied: bool) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("migrate"));

    let ctx = get_context(opts)?;
    let run_ctx = ctx.run_context();

    let result = if mark_applied {
        ctx.migrate_service.mark_applied(&run_ctx)
    } else {
        ctx.migrate_service.migrate(&run_ctx)
    };

    match result {
        Ok(None) => output::info("no new migrations"),
        Ok(Some(group)) => {
            log_event(
                &logger,
                LogEvent::new("migrate_completed")
                    .with_command("migrate")
                    .with_group(group.id),
            );
            if mark_applied {
                output::success(&format!("marked as applied in {}", group));
            } else {
                output::success(&format!("migrated to {}", group));
            }
        }
        Err(e) => {
            log_event(&logger, failure_event("migrate_failed", "migrate", &e));
            if matches!(e, Error::MigrationFailed { .. } | Error::Cancelled(_)) {
                output::warning("any migrations committed before the failure remain applied");
            }
            return Err(e.into());
        }
    }

    Ok(())
}
