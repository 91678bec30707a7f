//! Aggregate and link-table operations
//!
//! The reconciler and the manual operations layer funnel all their writes
//! through the composite methods here; each composite runs in one
//! transaction so a failing step rolls back its own effects.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::ops_log::{append_ops_log_tx, NewOpsLogEntry};
use super::{format_datetime, parse_datetime, parse_enum, Database};
use crate::error::{Error, Result};
use crate::models::{Aggregate, Direction, OpType, Projection};

const AGGREGATE_COLUMNS: &str = "id, canonical_amount_minor, canonical_currency, \
     canonical_timestamp, is_approx_time, canonical_direction, canonical_reference, \
     canonical_counterparty, canonical_account_hint, confidence_score, category_id, \
     user_notes, observation_count, created_at, updated_at";

/// A typed value for one of the editable aggregate fields
#[derive(Debug, Clone)]
pub(crate) enum EditValue {
    CategoryId(Option<i64>),
    UserNotes(Option<String>),
    Counterparty(Option<String>),
    Direction(Direction),
}

pub(super) fn row_to_aggregate(row: &Row<'_>) -> rusqlite::Result<Aggregate> {
    Ok(Aggregate {
        id: row.get(0)?,
        amount_minor: row.get(1)?,
        currency: row.get(2)?,
        timestamp: row.get(3)?,
        is_approx_time: row.get(4)?,
        direction: parse_enum(5, row.get::<_, String>(5)?)?,
        reference: row.get(6)?,
        counterparty: row.get(7)?,
        account_hint: row.get(8)?,
        confidence_score: row.get(9)?,
        category_id: row.get(10)?,
        user_notes: row.get(11)?,
        observation_count: row.get(12)?,
        created_at: parse_datetime(&row.get::<_, String>(13)?),
        updated_at: parse_datetime(&row.get::<_, String>(14)?),
    })
}

/// Rewrite an aggregate's canonical fields from a projection, leaving the
/// user-owned `category_id` and `user_notes` untouched. The observation
/// count is recomputed from the link table.
fn apply_projection_tx(
    conn: &Connection,
    aggregate_id: i64,
    proj: &Projection,
    now: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        UPDATE aggregates SET
            canonical_amount_minor = ?,
            canonical_currency = ?,
            canonical_timestamp = ?,
            is_approx_time = ?,
            canonical_direction = ?,
            canonical_reference = ?,
            canonical_counterparty = ?,
            canonical_account_hint = ?,
            confidence_score = ?,
            observation_count = (
                SELECT COUNT(*) FROM observation_links WHERE aggregate_id = ?
            ),
            updated_at = ?
        WHERE id = ?
        "#,
        params![
            proj.amount_minor,
            proj.currency,
            proj.timestamp,
            proj.is_approx_time,
            proj.direction.as_str(),
            proj.reference,
            proj.counterparty,
            proj.account_hint,
            proj.confidence_score,
            aggregate_id,
            now,
            aggregate_id,
        ],
    )?;
    Ok(())
}

fn insert_aggregate_tx(
    conn: &Connection,
    proj: &Projection,
    observation_count: i64,
    now: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        r#"
        INSERT INTO aggregates (
            canonical_amount_minor, canonical_currency, canonical_timestamp,
            is_approx_time, canonical_direction, canonical_reference,
            canonical_counterparty, canonical_account_hint, confidence_score,
            observation_count, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            proj.amount_minor,
            proj.currency,
            proj.timestamp,
            proj.is_approx_time,
            proj.direction.as_str(),
            proj.reference,
            proj.counterparty,
            proj.account_hint,
            proj.confidence_score,
            observation_count,
            now,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Database {
    pub fn get_aggregate(&self, id: i64) -> Result<Option<Aggregate>> {
        let conn = self.conn()?;
        let agg = conn
            .query_row(
                &format!("SELECT {} FROM aggregates WHERE id = ?", AGGREGATE_COLUMNS),
                params![id],
                row_to_aggregate,
            )
            .optional()?;
        Ok(agg)
    }

    /// Newest-first listing for display surfaces
    pub fn list_aggregates(&self, limit: i64, offset: i64) -> Result<Vec<Aggregate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM aggregates \
             ORDER BY canonical_timestamp IS NULL, canonical_timestamp DESC, id DESC \
             LIMIT ? OFFSET ?",
            AGGREGATE_COLUMNS
        ))?;
        let aggregates = stmt
            .query_map(params![limit, offset], row_to_aggregate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(aggregates)
    }

    /// Aggregates whose confidence is strictly below the threshold,
    /// least confident first
    pub fn get_review_queue(&self, confidence_threshold: i64) -> Result<Vec<Aggregate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM aggregates WHERE confidence_score < ? \
             ORDER BY confidence_score ASC, id ASC",
            AGGREGATE_COLUMNS
        ))?;
        let aggregates = stmt
            .query_map(params![confidence_threshold], row_to_aggregate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(aggregates)
    }

    pub fn count_aggregates(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM aggregates", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Ids of the observations linked to an aggregate, ascending
    pub fn linked_observation_ids(&self, aggregate_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT observation_id FROM observation_links \
             WHERE aggregate_id = ? ORDER BY observation_id",
        )?;
        let ids = stmt
            .query_map(params![aggregate_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Aggregates linked to any observation carrying this reference
    /// fingerprint
    pub fn find_candidate_aggregates_by_fp_ref(&self, fp: &str) -> Result<Vec<Aggregate>> {
        self.find_candidates_by_fingerprint("fp_ref", fp)
    }

    /// Aggregates linked to any observation carrying this amount+day
    /// fingerprint
    pub fn find_candidate_aggregates_by_fp_amt_day(&self, fp: &str) -> Result<Vec<Aggregate>> {
        self.find_candidates_by_fingerprint("fp_amt_day", fp)
    }

    fn find_candidates_by_fingerprint(&self, column: &str, fp: &str) -> Result<Vec<Aggregate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT a.{} FROM aggregates a \
             JOIN observation_links l ON l.aggregate_id = a.id \
             JOIN observations o ON o.id = l.observation_id \
             WHERE o.{} = ? ORDER BY a.id",
            AGGREGATE_COLUMNS.replace(", ", ", a."),
            column
        ))?;
        let aggregates = stmt
            .query_map(params![fp], row_to_aggregate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(aggregates)
    }

    /// Create a fresh aggregate seeded from a single observation and link
    /// it, atomically. The aggregate becomes valid the instant its first
    /// link lands in the same transaction.
    pub fn create_aggregate_for_observation(
        &self,
        observation_id: i64,
        proj: &Projection,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = format_datetime(now);

        let aggregate_id = insert_aggregate_tx(&tx, proj, 1, &now)?;
        tx.execute(
            "INSERT INTO observation_links (aggregate_id, observation_id, created_at) \
             VALUES (?, ?, ?)",
            params![aggregate_id, observation_id, now],
        )?;

        tx.commit()?;
        Ok(aggregate_id)
    }

    /// Link one more observation to an aggregate and rewrite its canonical
    /// fields from the given projection, atomically. Linking an already
    /// linked pair is a no-op for the link itself.
    pub fn attach_observation(
        &self,
        aggregate_id: i64,
        observation_id: i64,
        proj: &Projection,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = format_datetime(now);

        tx.execute(
            "INSERT OR IGNORE INTO observation_links (aggregate_id, observation_id, created_at) \
             VALUES (?, ?, ?)",
            params![aggregate_id, observation_id, now],
        )?;
        apply_projection_tx(&tx, aggregate_id, proj, &now)?;

        tx.commit()?;
        Ok(())
    }

    /// Re-project an aggregate in place from its current link set
    pub fn reproject_aggregate(
        &self,
        aggregate_id: i64,
        proj: &Projection,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        apply_projection_tx(&conn, aggregate_id, proj, &format_datetime(now))?;
        Ok(())
    }

    /// Move every link from `source` onto `target`, delete the emptied
    /// source aggregate, rewrite the target from `proj`, and append the
    /// MERGE audit entry, all in one transaction.
    ///
    /// Returns the observation ids that were moved.
    pub fn apply_force_merge(
        &self,
        target_id: i64,
        source_id: i64,
        proj: &Projection,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = format_datetime(now);

        let moved: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT observation_id FROM observation_links \
                 WHERE aggregate_id = ? ORDER BY observation_id",
            )?;
            let rows = stmt
                .query_map(params![source_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        for obs_id in &moved {
            tx.execute(
                "INSERT OR IGNORE INTO observation_links \
                 (aggregate_id, observation_id, created_at) VALUES (?, ?, ?)",
                params![target_id, obs_id, now],
            )?;
        }
        tx.execute(
            "DELETE FROM observation_links WHERE aggregate_id = ?",
            params![source_id],
        )?;
        tx.execute("DELETE FROM aggregates WHERE id = ?", params![source_id])?;

        apply_projection_tx(&tx, target_id, proj, &now)?;

        append_ops_log_tx(
            &tx,
            &NewOpsLogEntry {
                op_type: OpType::Merge,
                target_aggregate_id: target_id,
                secondary_aggregate_id: Some(source_id),
                affected_observation_ids: moved.clone(),
                field_name: None,
                old_value: None,
                new_value: None,
            },
            &now,
        )?;

        tx.commit()?;
        Ok(moved)
    }

    /// Carve `split_ids` out of `source` into a brand-new aggregate, moving
    /// their links and rewriting both sides, with the SPLIT audit entry,
    /// all in one transaction. Returns the new aggregate's id.
    ///
    /// Precondition checks live in the operations layer; this method trusts
    /// its inputs.
    pub fn apply_split(
        &self,
        source_id: i64,
        split_ids: &[i64],
        split_proj: &Projection,
        remainder_proj: &Projection,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = format_datetime(now);

        let new_id = insert_aggregate_tx(&tx, split_proj, split_ids.len() as i64, &now)?;

        let placeholders: Vec<&str> = split_ids.iter().map(|_| "?").collect();
        let sql = format!(
            "UPDATE observation_links SET aggregate_id = ? \
             WHERE aggregate_id = ? AND observation_id IN ({})",
            placeholders.join(", ")
        );
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&new_id, &source_id];
        for id in split_ids {
            params_vec.push(id);
        }
        let moved = tx.execute(&sql, params_vec.as_slice())?;
        if moved != split_ids.len() {
            return Err(Error::InvalidSplit(format!(
                "expected to move {} links, moved {}",
                split_ids.len(),
                moved
            )));
        }

        apply_projection_tx(&tx, source_id, remainder_proj, &now)?;

        append_ops_log_tx(
            &tx,
            &NewOpsLogEntry {
                op_type: OpType::Split,
                target_aggregate_id: source_id,
                secondary_aggregate_id: Some(new_id),
                affected_observation_ids: split_ids.to_vec(),
                field_name: None,
                old_value: None,
                new_value: None,
            },
            &now,
        )?;

        tx.commit()?;
        Ok(new_id)
    }

    /// Write one recognized field edit plus its EDIT_FIELD audit entry in a
    /// single transaction, bumping `updated_at`.
    pub(crate) fn apply_edit_field(
        &self,
        aggregate_id: i64,
        value: &EditValue,
        field_name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = format_datetime(now);

        match value {
            EditValue::CategoryId(v) => {
                tx.execute(
                    "UPDATE aggregates SET category_id = ?, updated_at = ? WHERE id = ?",
                    params![v, now, aggregate_id],
                )?;
            }
            EditValue::UserNotes(v) => {
                tx.execute(
                    "UPDATE aggregates SET user_notes = ?, updated_at = ? WHERE id = ?",
                    params![v, now, aggregate_id],
                )?;
            }
            EditValue::Counterparty(v) => {
                tx.execute(
                    "UPDATE aggregates SET canonical_counterparty = ?, updated_at = ? WHERE id = ?",
                    params![v, now, aggregate_id],
                )?;
            }
            EditValue::Direction(v) => {
                tx.execute(
                    "UPDATE aggregates SET canonical_direction = ?, updated_at = ? WHERE id = ?",
                    params![v.as_str(), now, aggregate_id],
                )?;
            }
        }

        append_ops_log_tx(
            &tx,
            &NewOpsLogEntry {
                op_type: OpType::EditField,
                target_aggregate_id: aggregate_id,
                secondary_aggregate_id: None,
                affected_observation_ids: Vec::new(),
                field_name: Some(field_name.to_string()),
                old_value: old_value.map(|s| s.to_string()),
                new_value: new_value.map(|s| s.to_string()),
            },
            &now,
        )?;

        tx.commit()?;
        Ok(())
    }
}
