//! Import session lifecycle and counters

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_datetime, parse_datetime, parse_enum, Database};
use crate::error::Result;
use crate::models::{ImportSession, SessionStatus, SourceType};

const SESSION_COLUMNS: &str = "id, source_type, source_locator, status, total, imported, \
     skipped, failed, error_message, started_at, completed_at";

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<ImportSession> {
    Ok(ImportSession {
        id: row.get(0)?,
        source_type: parse_enum(1, row.get::<_, String>(1)?)?,
        source_locator: row.get(2)?,
        status: parse_enum(3, row.get::<_, String>(3)?)?,
        total: row.get(4)?,
        imported: row.get(5)?,
        skipped: row.get(6)?,
        failed: row.get(7)?,
        error_message: row.get(8)?,
        started_at: parse_datetime(&row.get::<_, String>(9)?),
        completed_at: row
            .get::<_, Option<String>>(10)?
            .map(|s| parse_datetime(&s)),
    })
}

impl Database {
    /// Open a new session in PROCESSING state
    pub fn create_import_session(
        &self,
        source_type: SourceType,
        source_locator: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO import_sessions (source_type, source_locator, status, started_at) \
             VALUES (?, ?, ?, ?)",
            params![
                source_type.as_str(),
                source_locator,
                SessionStatus::Processing.as_str(),
                format_datetime(now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record final counters and mark the session COMPLETED
    pub fn complete_import_session(
        &self,
        session_id: i64,
        total: i64,
        imported: i64,
        skipped: i64,
        failed: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE import_sessions SET status = ?, total = ?, imported = ?, skipped = ?, \
             failed = ?, completed_at = ? WHERE id = ?",
            params![
                SessionStatus::Completed.as_str(),
                total,
                imported,
                skipped,
                failed,
                format_datetime(now),
                session_id,
            ],
        )?;
        Ok(())
    }

    /// Mark the session FAILED with a diagnostic
    pub fn fail_import_session(
        &self,
        session_id: i64,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE import_sessions SET status = ?, error_message = ?, completed_at = ? \
             WHERE id = ?",
            params![
                SessionStatus::Failed.as_str(),
                message,
                format_datetime(now),
                session_id,
            ],
        )?;
        Ok(())
    }

    pub fn get_import_session(&self, id: i64) -> Result<Option<ImportSession>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                &format!("SELECT {} FROM import_sessions WHERE id = ?", SESSION_COLUMNS),
                params![id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Recent sessions, newest first
    pub fn list_import_sessions(&self, limit: i64) -> Result<Vec<ImportSession>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_sessions ORDER BY id DESC LIMIT ?",
            SESSION_COLUMNS
        ))?;
        let sessions = stmt
            .query_map(params![limit], row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }
}
