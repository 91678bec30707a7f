//! LedgerMesh CLI - reconcile noisy transaction sources into one ledger
//!
//! Usage:
//!   ledgermesh init                          Initialize database
//!   ledgermesh import --file statement.csv   Import a CSV/PDF file
//!   ledgermesh reconcile                     Run a reconcile pass
//!   ledgermesh review                        Aggregates needing review
//!   ledgermesh merge --target 1 --source 2   Force-merge aggregates

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Import {
            file,
            sms_file,
            currency,
            mapping,
            preview,
        } => commands::cmd_import(
            &cli.db,
            file.as_deref(),
            sms_file.as_deref(),
            &currency,
            mapping.as_deref(),
            preview,
            cli.no_encrypt,
        ),
        Commands::Reconcile => commands::cmd_reconcile(&cli.db, cli.no_encrypt),
        Commands::Review { threshold } => commands::cmd_review(&cli.db, threshold, cli.no_encrypt),
        Commands::Merge { target, source } => {
            commands::cmd_merge(&cli.db, target, source, cli.no_encrypt)
        }
        Commands::Split {
            aggregate,
            observations,
        } => commands::cmd_split(&cli.db, aggregate, &observations, cli.no_encrypt),
        Commands::Edit {
            aggregate,
            field,
            value,
        } => commands::cmd_edit(&cli.db, aggregate, &field, value.as_deref(), cli.no_encrypt),
        Commands::History { aggregate, limit } => {
            commands::cmd_history(&cli.db, aggregate, limit, cli.no_encrypt)
        }
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
    }
}
