//! LedgerMesh Core Library
//!
//! On-device ingestion and reconciliation for personal finance data:
//! - Source parsers for bank SMS notifications, CSV exports and PDF
//!   statements
//! - A content-addressed, deduplicating observation store
//! - A deterministic canonical projector with evidence-based confidence
//! - A reconciliation engine linking observations into canonical
//!   aggregates
//! - Manual merge/split/edit operations with an append-only audit log
//! - An import orchestrator and a periodic SMS scan scheduler

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod import;
pub mod models;
pub mod ops;
pub mod parsers;
pub mod projector;
pub mod reconcile;
pub mod scheduler;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ReconcilerConfig, ScanConfig};
pub use db::{AggregateWatch, Database, LinkWatch, ObservationInsert};
pub use error::{Error, Result};
pub use import::{ImportService, SmsSource};
pub use ops::{OpsService, RECOGNIZED_EDIT_FIELDS};
pub use parsers::csv::{detect_delimiter, CsvParseResult};
pub use parsers::pdf::PdfParseResult;
pub use parsers::sms::{default_profiles, SmsParse, SmsParser};
pub use projector::{project, source_priority};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use scheduler::{AlwaysScan, ScanGate, ScanScheduler};
