//! Init, reconcile, review and status commands

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::{build_services, open_db};
use crate::commands::import::EmptySmsSource;

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let _db = open_db(db_path, no_encrypt)?;
    println!("Initialized database at {}", db_path.display());
    if no_encrypt {
        println!("Warning: database is NOT encrypted");
    }
    Ok(())
}

pub fn cmd_reconcile(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let services = build_services(db, Arc::new(EmptySmsSource))?;

    let outcome = services.reconciler.reconcile_all()?;
    println!(
        "Reconciled {} observations: {} linked to existing aggregates, {} new aggregates",
        outcome.processed, outcome.linked, outcome.created
    );
    Ok(())
}

pub fn cmd_review(db_path: &Path, threshold: Option<i64>, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let services = build_services(db, Arc::new(EmptySmsSource))?;

    let queue = match threshold {
        Some(t) => services.db.get_review_queue(t)?,
        None => services.reconciler.review_queue()?,
    };

    if queue.is_empty() {
        println!("Nothing to review");
        return Ok(());
    }

    println!("{} aggregates below the confidence threshold:\n", queue.len());
    for agg in queue {
        println!(
            "  #{:<6} {:>12} {:<4} {:<8} conf {:>3}  {}",
            agg.id,
            format_minor(agg.amount_minor),
            agg.currency,
            agg.direction,
            agg.confidence_score,
            agg.counterparty.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    println!("Observations: {}", db.count_observations()?);
    println!("Aggregates:   {}", db.count_aggregates()?);

    let sessions = db.list_import_sessions(5)?;
    if !sessions.is_empty() {
        println!("\nRecent imports:");
        for s in sessions {
            println!(
                "  #{:<4} {:<4} {:<24} {:<10} total {:<5} imported {:<5} skipped {:<5} failed {}",
                s.id, s.source_type, s.source_locator, s.status, s.total, s.imported, s.skipped,
                s.failed,
            );
            if let Some(err) = s.error_message {
                println!("        error: {}", err);
            }
        }
    }
    Ok(())
}

pub(crate) fn format_minor(amount_minor: i64) -> String {
    format!("{}.{:02}", amount_minor / 100, (amount_minor % 100).abs())
}
