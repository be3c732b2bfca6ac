pub mod commands;
pub mod logging;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tierbatch",
    about = "Membership tier batch operator CLI",
    long_about = "Run the monthly membership tier recalculation, inspect run history, and manage the database.",
    after_help = "Examples:\n  tierbatch migrate\n  tierbatch run --date 2026-11-01 --dry-run\n  tierbatch status --limit 5"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo tiers and customers")]
    Seed,
    #[command(about = "Recalculate every customer's tier and reset monthly purchase amounts")]
    Run {
        #[arg(long, help = "Billing cycle date used as the run key (defaults to today)")]
        date: Option<NaiveDate>,
        #[arg(long, help = "Compute assignments without writing anything")]
        dry_run: bool,
    },
    #[command(about = "Show recent runs and the next scheduled trigger")]
    Status {
        #[arg(long, default_value_t = 10, help = "Number of runs to list")]
        limit: u32,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Run { date, dry_run } => commands::run::run(date, dry_run),
        Command::Status { limit } => commands::status::run(limit),
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
