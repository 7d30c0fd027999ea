//! Logs command - view the local event log

use anyhow::Result;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use super::get_state_dir;
use tidemark_core::services::LoggingService;

fn get_logging_service() -> Result<LoggingService> {
    Ok(LoggingService::new(&get_state_dir(), env!("CARGO_PKG_VERSION"))?)
}

fn format_timestamp(timestamp_ms: i64) -> String {
    use chrono::{TimeZone, Utc};
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(limit: usize, errors: bool, json: bool) -> Result<()> {
    let service = get_logging_service()?;
    let entries = if errors {
        service.get_errors(limit)?
    } else {
        service.get_recent(limit)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No log entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Event", "Command", "Migration", "Group", "Error"]);

    for entry in &entries {
        let error_indicator = if entry.error_message.is_some() {
            "!".red().to_string()
        } else {
            String::new()
        };

        table.add_row(vec![
            format_timestamp(entry.timestamp),
            entry.event.clone(),
            entry.command.clone().unwrap_or_default(),
            entry.migration.clone().unwrap_or_default(),
            entry.group_id.map(|g| g.to_string()).unwrap_or_default(),
            error_indicator,
        ]);
    }

    println!("{}", table);

    // Show error details if any
    let recent_errors: Vec<_> = entries.iter().filter(|e| e.error_message.is_some()).take(3).collect();
    if !recent_errors.is_empty() {
        println!();
        println!("{}", "Recent Errors:".red().bold());
        for err in recent_errors {
            println!(
                "  {} [{}]: {}",
                format_timestamp(err.timestamp).dimmed(),
                err.event,
                err.error_message.as_deref().unwrap_or("Unknown error")
            );
        }
    }

    Ok(())
}
