//! Manual operation commands: merge, split, edit, history

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};

use super::{build_services, open_db};
use crate::commands::import::EmptySmsSource;

pub fn cmd_merge(db_path: &Path, target: i64, source: i64, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let services = build_services(db, Arc::new(EmptySmsSource))?;

    let moved = services.ops.force_merge(target, source)?;
    println!(
        "Merged aggregate #{} into #{} ({} observations moved)",
        source,
        target,
        moved.len()
    );
    Ok(())
}

pub fn cmd_split(
    db_path: &Path,
    aggregate: i64,
    observations: &str,
    no_encrypt: bool,
) -> Result<()> {
    let ids: Vec<i64> = observations
        .split(',')
        .map(|s| s.trim().parse())
        .collect::<Result<_, _>>()
        .map_err(|_| anyhow::anyhow!("--observations must be comma-separated ids"))?;

    let db = open_db(db_path, no_encrypt)?;
    let services = build_services(db, Arc::new(EmptySmsSource))?;

    let new_id = services.ops.split(aggregate, &ids)?;
    println!(
        "Split {} observations out of aggregate #{} into new aggregate #{}",
        ids.len(),
        aggregate,
        new_id
    );
    Ok(())
}

pub fn cmd_edit(
    db_path: &Path,
    aggregate: i64,
    field: &str,
    value: Option<&str>,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let services = build_services(db, Arc::new(EmptySmsSource))?;

    if !services.ops.recognized_edit_fields().contains(&field) {
        bail!(
            "Unknown field '{}'; recognized fields: {}",
            field,
            services.ops.recognized_edit_fields().join(", ")
        );
    }

    let old = services
        .db
        .get_aggregate(aggregate)?
        .and_then(|a| match field {
            "categoryId" => a.category_id.map(|v| v.to_string()),
            "userNotes" => a.user_notes,
            "canonicalCounterparty" => a.counterparty,
            "canonicalDirection" => Some(a.direction.to_string()),
            _ => None,
        });

    services
        .ops
        .edit_field(aggregate, field, old.as_deref(), value)?;
    println!("Updated {} on aggregate #{}", field, aggregate);
    Ok(())
}

pub fn cmd_history(
    db_path: &Path,
    aggregate: Option<i64>,
    limit: i64,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let entries = match aggregate {
        Some(id) => db.get_ops_log_for_aggregate(id)?,
        None => db.get_recent_ops_log(limit)?,
    };

    if entries.is_empty() {
        println!("No operations recorded");
        return Ok(());
    }

    for entry in entries {
        let secondary = entry
            .secondary_aggregate_id
            .map(|id| format!(" <-> #{}", id))
            .unwrap_or_default();
        let detail = match entry.field_name {
            Some(field) => format!(
                " {}: {:?} -> {:?}",
                field, entry.old_value, entry.new_value
            ),
            None if !entry.affected_observation_ids.is_empty() => {
                format!(" observations [{}]", entry.affected_observation_ids)
            }
            None => String::new(),
        };
        println!(
            "{} {:<14} #{}{}{}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.op_type,
            entry.target_aggregate_id,
            secondary,
            detail
        );
    }
    Ok(())
}
