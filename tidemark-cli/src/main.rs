//! Tidemark CLI - grouped schema migrations from the terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{create, init, logs, migrate, rollback, status, GlobalOpts};

/// Tidemark - apply and roll back database migrations in groups
#[derive(Parser)]
#[command(name = "tidemark", version, about, long_about = None)]
struct Cli {
    /// Migrations directory (overrides MIGRATIONS_DIR)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Abort migrate/rollback after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migration tables
    Init,

    /// Create up and down SQL migration files
    #[command(name = "create_sql")]
    CreateSql {
        /// Migration name; words are joined with underscores
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show applied and unapplied migrations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply all pending migrations as one group
    Migrate {
        /// Record pending migrations as applied without running them
        #[arg(long)]
        mark_applied: bool,
    },

    /// Roll back the last migration group
    Rollback,

    /// Show the local event log
    Logs {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOpts {
        dir: cli.dir,
        timeout: cli.timeout,
    };

    match cli.command {
        Commands::Init => init::run(&opts),
        Commands::CreateSql { name, json } => create::run(&opts, &name, json),
        Commands::Status { json } => status::run(&opts, json),
        Commands::Migrate { mark_applied } => migrate::run(&opts, mark_applied),
        Commands::Rollback => rollback::run(&opts),
        Commands::Logs { limit, errors, json } => logs::run(limit, errors, json),
    }
}
