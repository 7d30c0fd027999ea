//! Status command - show applied and unapplied migrations

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tidemark_core::services::{LogEvent, MigrationStatus, StatusReport};
use tidemark_core::{AppliedMigration, GroupId, MigrationId};

use super::{get_context, get_logger, log_event, GlobalOpts};
use crate::output;

/// JSON output structure
#[derive(Serialize)]
struct StatusOutput<'a> {
    migrations: &'a [MigrationStatus],
    unapplied: Vec<MigrationId>,
    last_group: Option<GroupId>,
    missing: &'a [AppliedMigration],
}

pub fn run(opts: &GlobalOpts, json: bool) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("status"));

    let ctx = get_context(opts)?;
    let report = ctx.status_service.report()?;

    if json {
        let output = StatusOutput {
            migrations: &report.migrations,
            unapplied: report.unapplied().iter().map(|m| m.id).collect(),
            last_group: report.last_group,
            missing: &report.missing,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &StatusReport) {
    if report.migrations.is_empty() {
        println!("migrations: none");
    } else {
        let mut table = output::create_table();
        table.set_header(vec!["Id", "Name", "Status", "Group", "Applied At", "Notes"]);

        for m in &report.migrations {
            let status = if m.is_applied() {
                "applied".green().to_string()
            } else {
                "pending".yellow().to_string()
            };
            let mut notes = Vec::new();
            if m.modified {
                notes.push("modified".red().to_string());
            }
            if !m.reversible {
                notes.push("irreversible".dimmed().to_string());
            }

            table.add_row(vec![
                m.id.to_string(),
                m.name.clone(),
                status,
                m.group_id.map(|g| g.to_string()).unwrap_or_default(),
                m.applied_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
                notes.join(", "),
            ]);
        }

        println!("{}", "migrations:".bold());
        println!("{}", table);
    }
    println!();

    let unapplied = report.unapplied();
    if unapplied.is_empty() {
        println!("unapplied migrations: none");
    } else {
        let labels: Vec<String> = unapplied.iter().map(|m| m.label()).collect();
        println!("unapplied migrations: {}", labels.join(", "));
    }

    match report.last_group {
        Some(group) => println!("last migration group: #{}", group),
        None => println!("last migration group: none"),
    }

    if !report.missing.is_empty() {
        println!();
        output::warning("applied migrations with no definition on disk:");
        for m in &report.missing {
            println!("  {} (group #{})", m.label(), m.group_id);
        }
    }

    let modified = report.modified();
    if !modified.is_empty() {
        println!();
        output::warning(&format!(
            "{} applied migration(s) changed since they were applied",
            modified.len()
        ));
    }
}
