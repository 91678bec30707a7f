//! Background SMS scan scheduler
//!
//! One named job slot per process: scheduling a scan replaces any pending
//! one. Each tick consults a host-provided gate (battery state lives with
//! the host), scans with up to three attempts under exponential backoff,
//! and gives up the slot after the third failure; a new schedule is then
//! required.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::ScanConfig;
use crate::error::Result;
use crate::import::ImportService;

/// Backoff after a failed scan attempt, doubled per retry
const BACKOFF_BASE: Duration = Duration::from_secs(60);

/// Attempts per scheduled scan before the job reports failure and stops
const MAX_ATTEMPTS: u32 = 3;

/// Host conditions under which a scan may run
pub trait ScanGate: Send + Sync {
    fn allow_scan(&self) -> bool;
}

/// Gate that always allows scanning, for hosts without battery constraints
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysScan;

impl ScanGate for AlwaysScan {
    fn allow_scan(&self) -> bool {
        true
    }
}

/// The process-wide scan job slot
#[derive(Default)]
pub struct ScanScheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScanScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the periodic scan. A previously scheduled scan is
    /// aborted; the later request supersedes it.
    pub fn start(
        &self,
        service: Arc<ImportService>,
        gate: Arc<dyn ScanGate>,
        clock: Arc<dyn Clock>,
        config: ScanConfig,
    ) -> Result<()> {
        config.validate()?;
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.abort();
            info!("superseding previously scheduled SMS scan");
        }
        info!(
            interval_minutes = config.scan_interval_minutes,
            "starting periodic SMS scan"
        );
        *slot = Some(tokio::spawn(run_scan_loop(service, gate, clock, config)));
        Ok(())
    }

    /// Cancel the scheduled scan, if any
    pub fn stop(&self) {
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
            info!("stopped periodic SMS scan");
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

async fn run_scan_loop(
    service: Arc<ImportService>,
    gate: Arc<dyn ScanGate>,
    clock: Arc<dyn Clock>,
    config: ScanConfig,
) {
    let mut ticker = interval(Duration::from_secs(config.scan_interval_minutes * 60));
    // The first tick fires immediately; skip it so a fresh schedule doesn't
    // scan on startup
    ticker.tick().await;

    let mut watermark: Option<i64> = None;
    loop {
        ticker.tick().await;

        if !gate.allow_scan() {
            info!("scan gate closed, skipping this cycle");
            continue;
        }

        let scan_started = clock.now_millis();
        match scan_with_retry(&service, watermark).await {
            Ok(()) => {
                watermark = Some(scan_started);
            }
            Err(e) => {
                error!(
                    attempts = MAX_ATTEMPTS,
                    error = %e,
                    "periodic SMS scan failed, job stopped; reschedule to resume"
                );
                return;
            }
        }
    }
}

async fn scan_with_retry(service: &ImportService, watermark: Option<i64>) -> Result<()> {
    let mut backoff = BACKOFF_BASE;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match watermark {
            Some(after_ms) => service.import_sms_since(after_ms),
            None => service.import_sms_all(),
        };
        match result {
            Ok(outcome) => {
                info!(
                    session = outcome.session_id,
                    imported = outcome.imported,
                    skipped = outcome.skipped,
                    failed = outcome.failed,
                    "periodic SMS scan complete"
                );
                return Ok(());
            }
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!(attempt, error = %e, "scan attempt failed, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::ReconcilerConfig;
    use crate::db::Database;
    use crate::error::Result;
    use crate::import::SmsSource;
    use crate::models::SmsMessage;
    use crate::parsers::sms::{default_profiles, SmsParser};
    use crate::reconcile::Reconciler;

    struct EmptyInbox;

    impl SmsSource for EmptyInbox {
        fn all(&self) -> Result<Vec<SmsMessage>> {
            Ok(Vec::new())
        }

        fn since(&self, _after_ms: i64) -> Result<Vec<SmsMessage>> {
            Ok(Vec::new())
        }
    }

    fn service() -> Arc<ImportService> {
        let db = Database::in_memory().unwrap();
        let clock = Arc::new(SystemClock);
        let reconciler = Arc::new(
            Reconciler::new(db.clone(), ReconcilerConfig::default(), clock.clone()).unwrap(),
        );
        Arc::new(ImportService::new(
            db,
            Arc::new(SmsParser::new(default_profiles())),
            Arc::new(EmptyInbox),
            reconciler,
            clock,
        ))
    }

    #[test]
    fn gate_default_allows() {
        assert!(AlwaysScan.allow_scan());
    }

    #[tokio::test]
    async fn scheduling_supersedes_and_stops() {
        let scheduler = ScanScheduler::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let gate: Arc<dyn ScanGate> = Arc::new(AlwaysScan);
        let config = ScanConfig::default();

        scheduler
            .start(service(), gate.clone(), clock.clone(), config)
            .unwrap();
        assert!(scheduler.is_scheduled());

        // a second start supersedes the first without error
        scheduler.start(service(), gate, clock, config).unwrap();
        assert!(scheduler.is_scheduled());

        scheduler.stop();
        assert!(!scheduler.is_scheduled());
    }

    #[tokio::test]
    async fn interval_below_minimum_is_rejected() {
        let scheduler = ScanScheduler::new();
        let result = scheduler.start(
            service(),
            Arc::new(AlwaysScan),
            Arc::new(SystemClock),
            ScanConfig {
                scan_interval_minutes: 5,
            },
        );
        assert!(result.is_err());
        assert!(!scheduler.is_scheduled());
    }
}
