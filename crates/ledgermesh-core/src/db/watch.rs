//! Poll-based change watching for display surfaces
//!
//! Each watch pins one pooled connection and polls SQLite's `data_version`,
//! which moves whenever another connection commits. The contract is
//! monotonic progress and eventual delivery, not per-row diffs: a consumer
//! polls, and when anything changed re-reads a consistent snapshot.

use rusqlite::Row;

use super::aggregates::row_to_aggregate;
use super::{parse_datetime, Database, DbConn};
use crate::error::Result;
use crate::models::{Aggregate, ObservationLink};

fn data_version(conn: &DbConn) -> Result<i64> {
    let version = conn.query_row("PRAGMA data_version", [], |row| row.get(0))?;
    Ok(version)
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<ObservationLink> {
    Ok(ObservationLink {
        aggregate_id: row.get(0)?,
        observation_id: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
    })
}

/// Watch handle over the aggregates table
pub struct AggregateWatch {
    conn: DbConn,
    last_version: Option<i64>,
}

impl AggregateWatch {
    /// Report whether the database changed since the last poll.
    /// The first poll always reports a change.
    pub fn poll_changed(&mut self) -> Result<bool> {
        let version = data_version(&self.conn)?;
        let changed = self.last_version != Some(version);
        self.last_version = Some(version);
        Ok(changed)
    }

    /// A consistent read of every aggregate, newest first
    pub fn snapshot(&self) -> Result<Vec<Aggregate>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, canonical_amount_minor, canonical_currency, canonical_timestamp, \
             is_approx_time, canonical_direction, canonical_reference, canonical_counterparty, \
             canonical_account_hint, confidence_score, category_id, user_notes, \
             observation_count, created_at, updated_at FROM aggregates \
             ORDER BY canonical_timestamp IS NULL, canonical_timestamp DESC, id DESC",
        )?;
        let aggregates = stmt
            .query_map([], row_to_aggregate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(aggregates)
    }

    /// Snapshot only when something changed since the last poll
    pub fn next(&mut self) -> Result<Option<Vec<Aggregate>>> {
        if self.poll_changed()? {
            Ok(Some(self.snapshot()?))
        } else {
            Ok(None)
        }
    }
}

/// Watch handle over the link table
pub struct LinkWatch {
    conn: DbConn,
    last_version: Option<i64>,
}

impl LinkWatch {
    pub fn poll_changed(&mut self) -> Result<bool> {
        let version = data_version(&self.conn)?;
        let changed = self.last_version != Some(version);
        self.last_version = Some(version);
        Ok(changed)
    }

    pub fn snapshot(&self) -> Result<Vec<ObservationLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT aggregate_id, observation_id, created_at FROM observation_links \
             ORDER BY aggregate_id, observation_id",
        )?;
        let links = stmt
            .query_map([], row_to_link)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(links)
    }

    pub fn next(&mut self) -> Result<Option<Vec<ObservationLink>>> {
        if self.poll_changed()? {
            Ok(Some(self.snapshot()?))
        } else {
            Ok(None)
        }
    }
}

impl Database {
    pub fn watch_aggregates(&self) -> Result<AggregateWatch> {
        Ok(AggregateWatch {
            conn: self.conn()?,
            last_version: None,
        })
    }

    pub fn watch_links(&self) -> Result<LinkWatch> {
        Ok(LinkWatch {
            conn: self.conn()?,
            last_version: None,
        })
    }
}
