//! Observation store operations
//!
//! Observations are write-once: insertion is idempotent on the unique
//! content hash and nothing ever updates a stored row.

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, parse_enum, Database};
use crate::error::Result;
use crate::models::{NewObservation, Observation};

/// Result of inserting an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationInsert {
    /// Stored as a new row, contains the new observation id
    Inserted(i64),
    /// Identical content already stored, contains the existing id
    Skipped(i64),
}

impl ObservationInsert {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Skipped(id) => *id,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

const OBSERVATION_COLUMNS: &str = "id, source_type, source_locator, raw_payload, amount_minor, \
     currency, timestamp, timestamp_date_only, direction, reference, counterparty, account_hint, \
     parse_confidence, content_hash, import_session_id, fp_ref, fp_amt_time, fp_amt_day, \
     fp_sender_amt, created_at";

pub(super) fn row_to_observation(row: &Row<'_>) -> rusqlite::Result<Observation> {
    Ok(Observation {
        id: row.get(0)?,
        source_type: parse_enum(1, row.get::<_, String>(1)?)?,
        source_locator: row.get(2)?,
        raw_payload: row.get(3)?,
        amount_minor: row.get(4)?,
        currency: row.get(5)?,
        timestamp: row.get(6)?,
        timestamp_date_only: row.get(7)?,
        direction: parse_enum(8, row.get::<_, String>(8)?)?,
        reference: row.get(9)?,
        counterparty: row.get(10)?,
        account_hint: row.get(11)?,
        parse_confidence: row.get(12)?,
        content_hash: row.get(13)?,
        import_session_id: row.get(14)?,
        fp_ref: row.get(15)?,
        fp_amt_time: row.get(16)?,
        fp_amt_day: row.get(17)?,
        fp_sender_amt: row.get(18)?,
        created_at: parse_datetime(&row.get::<_, String>(19)?),
    })
}

impl Database {
    /// Insert an observation, deduplicating on content hash
    ///
    /// A duplicate is a non-error skip: the result reports which outcome
    /// occurred and the row id either way.
    pub fn insert_observation(
        &self,
        obs: &NewObservation,
        import_session_id: Option<i64>,
    ) -> Result<ObservationInsert> {
        let conn = self.conn()?;

        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO observations (
                source_type, source_locator, raw_payload, amount_minor, currency,
                timestamp, timestamp_date_only, direction, reference, counterparty,
                account_hint, parse_confidence, content_hash, import_session_id,
                fp_ref, fp_amt_time, fp_amt_day, fp_sender_amt
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                obs.source_type.as_str(),
                obs.source_locator,
                obs.raw_payload,
                obs.amount_minor,
                obs.currency,
                obs.timestamp,
                obs.timestamp_date_only,
                obs.direction.as_str(),
                obs.reference,
                obs.counterparty,
                obs.account_hint,
                obs.parse_confidence,
                obs.content_hash,
                import_session_id,
                obs.fp_ref,
                obs.fp_amt_time,
                obs.fp_amt_day,
                obs.fp_sender_amt,
            ],
        )?;

        if changed == 1 {
            return Ok(ObservationInsert::Inserted(conn.last_insert_rowid()));
        }

        let existing: i64 = conn.query_row(
            "SELECT id FROM observations WHERE content_hash = ?",
            params![obs.content_hash],
            |row| row.get(0),
        )?;
        Ok(ObservationInsert::Skipped(existing))
    }

    /// Insert a batch, returning the per-row outcome in input order
    pub fn insert_observation_batch(
        &self,
        batch: &[NewObservation],
        import_session_id: Option<i64>,
    ) -> Result<Vec<ObservationInsert>> {
        let mut results = Vec::with_capacity(batch.len());
        for obs in batch {
            results.push(self.insert_observation(obs, import_session_id)?);
        }
        Ok(results)
    }

    pub fn get_observation(&self, id: i64) -> Result<Option<Observation>> {
        let conn = self.conn()?;
        let obs = conn
            .query_row(
                &format!("SELECT {} FROM observations WHERE id = ?", OBSERVATION_COLUMNS),
                params![id],
                row_to_observation,
            )
            .optional()?;
        Ok(obs)
    }

    pub fn get_observation_by_content_hash(&self, hash: &str) -> Result<Option<Observation>> {
        let conn = self.conn()?;
        let obs = conn
            .query_row(
                &format!(
                    "SELECT {} FROM observations WHERE content_hash = ?",
                    OBSERVATION_COLUMNS
                ),
                params![hash],
                row_to_observation,
            )
            .optional()?;
        Ok(obs)
    }

    pub fn find_observations_by_fp_ref(&self, fp: &str) -> Result<Vec<Observation>> {
        self.find_by_fingerprint("fp_ref", fp)
    }

    pub fn find_observations_by_fp_amt_time(&self, fp: &str) -> Result<Vec<Observation>> {
        self.find_by_fingerprint("fp_amt_time", fp)
    }

    pub fn find_observations_by_fp_amt_day(&self, fp: &str) -> Result<Vec<Observation>> {
        self.find_by_fingerprint("fp_amt_day", fp)
    }

    pub fn find_observations_by_fp_sender_amt(&self, fp: &str) -> Result<Vec<Observation>> {
        self.find_by_fingerprint("fp_sender_amt", fp)
    }

    fn find_by_fingerprint(&self, column: &str, fp: &str) -> Result<Vec<Observation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM observations WHERE {} = ? ORDER BY id",
            OBSERVATION_COLUMNS, column
        ))?;
        let observations = stmt
            .query_map(params![fp], row_to_observation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(observations)
    }

    /// Observations with no row in the link table, in id order
    pub fn get_unlinked_observations(&self) -> Result<Vec<Observation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM observations o \
             WHERE NOT EXISTS (SELECT 1 FROM observation_links l WHERE l.observation_id = o.id) \
             ORDER BY o.id",
            OBSERVATION_COLUMNS
        ))?;
        let observations = stmt
            .query_map([], row_to_observation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(observations)
    }

    /// Observations linked to an aggregate, in id order
    pub fn get_observations_for_aggregate(&self, aggregate_id: i64) -> Result<Vec<Observation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM observations o \
             JOIN observation_links l ON l.observation_id = o.id \
             WHERE l.aggregate_id = ? ORDER BY o.id",
            OBSERVATION_COLUMNS.replace("created_at", "o.created_at")
        ))?;
        let observations = stmt
            .query_map(params![aggregate_id], row_to_observation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(observations)
    }

    pub fn count_observations(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
        Ok(count)
    }
}
