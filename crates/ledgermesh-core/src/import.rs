//! Import orchestration: session lifecycle around parse → store → reconcile
//!
//! Every import opens a session, drives the right parser, batch-inserts the
//! observations (duplicates are silent skips), records the counters, then
//! runs a reconcile pass. Any propagated error flips the session to FAILED
//! with a diagnostic before the error continues up.

use std::io::Read;
use std::sync::Arc;

use tracing::{error, info};

use crate::clock::Clock;
use crate::db::Database;
use crate::error::Result;
use crate::models::{ColumnMapping, CsvPreview, ImportOutcome, NewObservation, SmsMessage, SourceType};
use crate::parsers::sms::{SmsParse, SmsParser};
use crate::parsers::{csv, pdf};
use crate::reconcile::Reconciler;

/// Hands over SMS notifications from the device inbox; reading the inbox
/// (and the consent around it) lives outside the core.
pub trait SmsSource: Send + Sync {
    fn all(&self) -> Result<Vec<SmsMessage>>;
    fn since(&self, after_ms: i64) -> Result<Vec<SmsMessage>>;
}

/// Long-lived import orchestrator, built once and shared by handle
pub struct ImportService {
    db: Database,
    sms_parser: Arc<SmsParser>,
    sms_source: Arc<dyn SmsSource>,
    reconciler: Arc<Reconciler>,
    clock: Arc<dyn Clock>,
}

impl ImportService {
    pub fn new(
        db: Database,
        sms_parser: Arc<SmsParser>,
        sms_source: Arc<dyn SmsSource>,
        reconciler: Arc<Reconciler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            sms_parser,
            sms_source,
            reconciler,
            clock,
        }
    }

    /// Inspect a CSV stream without touching the store
    pub fn preview_csv<R: Read>(&self, reader: R, _name: &str) -> Result<CsvPreview> {
        csv::preview(reader)
    }

    pub fn import_csv<R: Read>(
        &self,
        reader: R,
        name: &str,
        mapping: &ColumnMapping,
    ) -> Result<ImportOutcome> {
        let session_id =
            self.db
                .create_import_session(SourceType::Csv, name, self.clock.now_utc())?;
        self.guard_session(session_id, || {
            let parsed = csv::parse(reader, name, mapping)?;
            let errors = parsed
                .errors
                .iter()
                .map(|e| format!("row {}: {}", e.row_index, e.message))
                .collect();
            self.finish(session_id, parsed.observations, errors, 0)
        })
    }

    pub fn import_pdf(&self, data: &[u8], name: &str, currency: &str) -> Result<ImportOutcome> {
        let session_id =
            self.db
                .create_import_session(SourceType::Pdf, name, self.clock.now_utc())?;
        self.guard_session(session_id, || {
            let parsed = pdf::parse(data, name, currency)?;
            let errors = parsed
                .errors
                .iter()
                .map(|e| format!("line {}: {}", e.row_index, e.message))
                .collect();
            self.finish(session_id, parsed.observations, errors, 0)
        })
    }

    /// Scan the whole inbox
    pub fn import_sms_all(&self) -> Result<ImportOutcome> {
        let session_id =
            self.db
                .create_import_session(SourceType::Sms, "sms:all", self.clock.now_utc())?;
        self.guard_session(session_id, || {
            let messages = self.sms_source.all()?;
            self.finish_sms(session_id, messages)
        })
    }

    /// Scan messages newer than the watermark
    pub fn import_sms_since(&self, after_ms: i64) -> Result<ImportOutcome> {
        let locator = format!("sms:since:{}", after_ms);
        let session_id =
            self.db
                .create_import_session(SourceType::Sms, &locator, self.clock.now_utc())?;
        self.guard_session(session_id, || {
            let messages = self.sms_source.since(after_ms)?;
            self.finish_sms(session_id, messages)
        })
    }

    fn finish_sms(&self, session_id: i64, messages: Vec<SmsMessage>) -> Result<ImportOutcome> {
        let mut observations = Vec::new();
        let mut unmatched = 0_i64;
        for msg in &messages {
            match self.sms_parser.parse(msg) {
                SmsParse::Parsed(obs) => observations.push(obs),
                SmsParse::Unmatched { profile_id } => {
                    unmatched += 1;
                    if let Some(id) = profile_id {
                        info!(message = msg.id, profile = id, "profile matched but extracted nothing");
                    }
                }
            }
        }
        self.finish(session_id, observations, Vec::new(), unmatched)
    }

    /// Common tail: batch insert, counters, reconcile pass
    fn finish(
        &self,
        session_id: i64,
        observations: Vec<NewObservation>,
        errors: Vec<String>,
        unmatched: i64,
    ) -> Result<ImportOutcome> {
        let inserts = self.db.insert_observation_batch(&observations, Some(session_id))?;
        let imported = inserts.iter().filter(|r| r.was_inserted()).count() as i64;
        let skipped = inserts.len() as i64 - imported;
        let failed = errors.len() as i64 + unmatched;
        let total = observations.len() as i64 + failed;

        self.db.complete_import_session(
            session_id,
            total,
            imported,
            skipped,
            failed,
            self.clock.now_utc(),
        )?;

        self.reconciler.reconcile_all()?;

        info!(
            session = session_id,
            total, imported, skipped, failed, "import complete"
        );
        Ok(ImportOutcome {
            session_id,
            total,
            imported,
            skipped,
            failed,
            errors,
        })
    }

    /// Mark the session FAILED when the work errors, then let the error
    /// continue to the caller
    fn guard_session<F>(&self, session_id: i64, work: F) -> Result<ImportOutcome>
    where
        F: FnOnce() -> Result<ImportOutcome>,
    {
        match work() {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(mark) =
                    self.db
                        .fail_import_session(session_id, &e.to_string(), self.clock.now_utc())
                {
                    error!(session = session_id, error = %mark, "could not mark session failed");
                }
                Err(e)
            }
        }
    }
}
