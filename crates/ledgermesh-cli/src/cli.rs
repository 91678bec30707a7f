//! CLI argument definitions using clap
//!
//! This module contains the clap structs and enums for parsing arguments.
//! The command implementations live in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// LedgerMesh - reconcile noisy transaction sources into one ledger
#[derive(Parser)]
#[command(name = "ledgermesh")]
#[command(about = "On-device ingestion and reconciliation for personal finances", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "ledgermesh.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default the database is encrypted; set LEDGERMESH_DB_KEY with
    /// your passphrase. Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Import a CSV or PDF file, or an exported SMS dump
    Import {
        /// CSV or PDF file to import (type detected from the extension)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// JSON file with exported SMS messages
        #[arg(long, conflicts_with = "file")]
        sms_file: Option<PathBuf>,

        /// ISO-4217 currency for CSV/PDF rows
        #[arg(short, long, default_value = "USD")]
        currency: String,

        /// Column mapping JSON (otherwise the suggestion from the headers
        /// is used)
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Show the preview and suggested mapping without importing
        #[arg(long)]
        preview: bool,
    },

    /// Run a reconcile pass over unlinked observations
    Reconcile,

    /// List aggregates below the confidence threshold
    Review {
        /// Override the configured threshold
        #[arg(short, long)]
        threshold: Option<i64>,
    },

    /// Force-merge one aggregate into another
    Merge {
        /// Aggregate that survives
        #[arg(short, long)]
        target: i64,

        /// Aggregate whose observations move over
        #[arg(short, long)]
        source: i64,
    },

    /// Split observations out of an aggregate
    Split {
        /// Source aggregate
        #[arg(short, long)]
        aggregate: i64,

        /// Comma-separated observation ids to carve out
        #[arg(short, long)]
        observations: String,
    },

    /// Edit a user-editable aggregate field
    Edit {
        #[arg(short, long)]
        aggregate: i64,

        /// One of: categoryId, userNotes, canonicalCounterparty,
        /// canonicalDirection
        #[arg(short, long)]
        field: String,

        /// New value; omit to clear
        #[arg(long)]
        value: Option<String>,
    },

    /// Show the ops audit log
    History {
        /// Restrict to one aggregate
        #[arg(short, long)]
        aggregate: Option<i64>,

        /// Entries to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show store counts and recent sessions
    Status,
}
