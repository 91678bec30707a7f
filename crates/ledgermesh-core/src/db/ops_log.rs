//! Append-only audit of manual operations

use rusqlite::{params, Connection, Row};

use super::{parse_datetime, parse_enum, Database};
use crate::error::Result;
use crate::models::{OpType, OpsLogEntry};

/// An audit entry about to be appended
#[derive(Debug, Clone)]
pub(crate) struct NewOpsLogEntry {
    pub op_type: OpType,
    pub target_aggregate_id: i64,
    pub secondary_aggregate_id: Option<i64>,
    pub affected_observation_ids: Vec<i64>,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Append an entry on an existing connection so composite operations can
/// include the audit write in their own transaction.
pub(super) fn append_ops_log_tx(
    conn: &Connection,
    entry: &NewOpsLogEntry,
    now: &str,
) -> rusqlite::Result<i64> {
    let affected = entry
        .affected_observation_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    conn.execute(
        r#"
        INSERT INTO ops_log (
            op_type, target_aggregate_id, secondary_aggregate_id,
            affected_observation_ids, field_name, old_value, new_value, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            entry.op_type.as_str(),
            entry.target_aggregate_id,
            entry.secondary_aggregate_id,
            affected,
            entry.field_name,
            entry.old_value,
            entry.new_value,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<OpsLogEntry> {
    Ok(OpsLogEntry {
        id: row.get(0)?,
        op_type: parse_enum(1, row.get::<_, String>(1)?)?,
        target_aggregate_id: row.get(2)?,
        secondary_aggregate_id: row.get(3)?,
        affected_observation_ids: row.get(4)?,
        field_name: row.get(5)?,
        old_value: row.get(6)?,
        new_value: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

const OPS_LOG_COLUMNS: &str = "id, op_type, target_aggregate_id, secondary_aggregate_id, \
     affected_observation_ids, field_name, old_value, new_value, created_at";

impl Database {
    /// Append a standalone audit entry (operations that mutate nothing else)
    pub(crate) fn append_ops_log(&self, entry: &NewOpsLogEntry, now: &str) -> Result<i64> {
        let conn = self.conn()?;
        Ok(append_ops_log_tx(&conn, entry, now)?)
    }

    /// History for one aggregate, newest first
    pub fn get_ops_log_for_aggregate(&self, aggregate_id: i64) -> Result<Vec<OpsLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM ops_log WHERE target_aggregate_id = ? \
             ORDER BY created_at DESC, id DESC",
            OPS_LOG_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![aggregate_id], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// The last `n` entries across all aggregates, newest first
    pub fn get_recent_ops_log(&self, n: i64) -> Result<Vec<OpsLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM ops_log ORDER BY created_at DESC, id DESC LIMIT ?",
            OPS_LOG_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![n], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
