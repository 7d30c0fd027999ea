//! Create command - scaffold a new up/down migration pair

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tidemark_core::services::{LogEvent, ScaffoldService};

use super::{get_logger, load_config, log_event, GlobalOpts};

#[derive(Serialize)]
struct CreateOutput<'a> {
    id: u64,
    name: &'a str,
    files: Vec<&'a Path>,
}

pub fn run(opts: &GlobalOpts, words: &[String], json: bool) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("create_sql"));

    let config = load_config(opts)?;
    let result = ScaffoldService::new(&config.migrations_dir).create(words)?;

    log_event(
        &logger,
        LogEvent::new("migration_created")
            .with_command("create_sql")
            .with_migration(format!("{}_{}", result.id, result.name)),
    );

    if json {
        let output = CreateOutput {
            id: result.id.value(),
            name: &result.name,
            files: vec![result.up.path.as_path(), result.down.path.as_path()],
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for file in [&result.up, &result.down] {
        println!("created {} ({})", file.name, file.path.display());
    }

    Ok(())
}
