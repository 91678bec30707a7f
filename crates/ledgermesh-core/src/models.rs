//! Domain models for LedgerMesh

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint;

/// Where an observation was sighted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    Sms,
    Csv,
    Pdf,
    Xlsx,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "SMS",
            Self::Csv => "CSV",
            Self::Pdf => "PDF",
            Self::Xlsx => "XLSX",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SMS" => Ok(Self::Sms),
            "CSV" => Ok(Self::Csv),
            "PDF" => Ok(Self::Pdf),
            "XLSX" => Ok(Self::Xlsx),
            _ => Err(format!("Unknown source type: {}", s)),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Money flow direction
///
/// `Mixed` is reserved for aggregates whose observations disagree; it never
/// appears on an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Debit,
    Credit,
    #[default]
    Unknown,
    Mixed,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "DEBIT",
            Self::Credit => "CREDIT",
            Self::Unknown => "UNKNOWN",
            Self::Mixed => "MIXED",
        }
    }

    /// Two directions can describe the same transaction when they are equal
    /// or at least one of them is still unknown.
    pub fn compatible_with(&self, other: Direction) -> bool {
        *self == other || *self == Self::Unknown || other == Self::Unknown
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEBIT" => Ok(Self::Debit),
            "CREDIT" => Ok(Self::Credit),
            "UNKNOWN" => Ok(Self::Unknown),
            "MIXED" => Ok(Self::Mixed),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One raw sighting of a transaction, immutable once stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub source_type: SourceType,
    /// Human label for the source (SMS sender address, filename)
    pub source_locator: String,
    /// Original text the parser consumed
    pub raw_payload: String,
    /// Smallest currency unit, never negative
    pub amount_minor: i64,
    /// ISO-4217 code
    pub currency: String,
    /// Epoch milliseconds
    pub timestamp: Option<i64>,
    /// True when the source gave only a calendar date
    pub timestamp_date_only: bool,
    pub direction: Direction,
    pub reference: Option<String>,
    pub counterparty: Option<String>,
    pub account_hint: Option<String>,
    /// Parser's own confidence in this extraction, 0.0..=1.0
    pub parse_confidence: f64,
    /// SHA-256 over `source_type | locator | raw_payload`; unique per store
    pub content_hash: String,
    pub import_session_id: Option<i64>,
    pub fp_ref: Option<String>,
    pub fp_amt_time: Option<String>,
    pub fp_amt_day: Option<String>,
    pub fp_sender_amt: String,
    pub created_at: DateTime<Utc>,
}

/// A parsed observation before it hits the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewObservation {
    pub source_type: SourceType,
    pub source_locator: String,
    pub raw_payload: String,
    pub amount_minor: i64,
    pub currency: String,
    pub timestamp: Option<i64>,
    pub timestamp_date_only: bool,
    pub direction: Direction,
    pub reference: Option<String>,
    pub counterparty: Option<String>,
    pub account_hint: Option<String>,
    pub parse_confidence: f64,
    pub content_hash: String,
    pub fp_ref: Option<String>,
    pub fp_amt_time: Option<String>,
    pub fp_amt_day: Option<String>,
    pub fp_sender_amt: String,
}

impl NewObservation {
    /// Derive the content hash and all fingerprints from the raw fields.
    ///
    /// Parsers fill the raw fields and call this once; the reconciler reads
    /// the denormalized keys and never rehashes. A `Mixed` direction is
    /// coerced to `Unknown` here since only aggregates may carry it.
    pub fn seal(mut self) -> Self {
        if self.direction == Direction::Mixed {
            self.direction = Direction::Unknown;
        }
        self.content_hash = fingerprint::content_hash(
            self.source_type,
            &self.source_locator,
            &self.raw_payload,
        );
        self.fp_ref = fingerprint::fp_ref(self.reference.as_deref().unwrap_or(""));
        self.fp_amt_time = fingerprint::fp_amt_time(self.amount_minor, self.timestamp);
        self.fp_amt_day = fingerprint::fp_amt_day(self.amount_minor, self.timestamp);
        self.fp_sender_amt = fingerprint::fp_sender_amt(&self.source_locator, self.amount_minor);
        self
    }
}

/// Canonical merged transaction backed by one or more observations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub id: i64,
    pub amount_minor: i64,
    pub currency: String,
    pub timestamp: Option<i64>,
    /// True when every backing observation carried only a calendar date
    pub is_approx_time: bool,
    pub direction: Direction,
    pub reference: Option<String>,
    pub counterparty: Option<String>,
    pub account_hint: Option<String>,
    /// 0..=100 summary of how strongly the evidence agrees
    pub confidence_score: i64,
    /// User-owned, never touched by reconciliation
    pub category_id: Option<i64>,
    /// User-owned, never touched by reconciliation
    pub user_notes: Option<String>,
    pub observation_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the aggregate ↔ observation link table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationLink {
    pub aggregate_id: i64,
    pub observation_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Output of the canonical projector: the display fields an aggregate should
/// carry given its current observation set. User-owned fields are not part of
/// a projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub amount_minor: i64,
    pub currency: String,
    pub timestamp: Option<i64>,
    pub is_approx_time: bool,
    pub direction: Direction,
    pub reference: Option<String>,
    pub counterparty: Option<String>,
    pub account_hint: Option<String>,
    pub confidence_score: i64,
}

/// A user-defined spending category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Import session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One ingestion run and its counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSession {
    pub id: i64,
    pub source_type: SourceType,
    pub source_locator: String,
    pub status: SessionStatus,
    /// Rows the parser produced (observations plus failures)
    pub total: i64,
    /// Observations actually inserted
    pub imported: i64,
    /// Deduplicated against an existing content hash
    pub skipped: i64,
    /// Parser errors plus unmatched messages
    pub failed: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Manual operation kind, as recorded in the ops log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpType {
    Merge,
    Split,
    MarkDuplicate,
    EditField,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "MERGE",
            Self::Split => "SPLIT",
            Self::MarkDuplicate => "MARK_DUPLICATE",
            Self::EditField => "EDIT_FIELD",
        }
    }
}

impl std::str::FromStr for OpType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MERGE" => Ok(Self::Merge),
            "SPLIT" => Ok(Self::Split),
            "MARK_DUPLICATE" => Ok(Self::MarkDuplicate),
            "EDIT_FIELD" => Ok(Self::EditField),
            _ => Err(format!("Unknown op type: {}", s)),
        }
    }
}

impl std::fmt::Display for OpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record of one manual operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsLogEntry {
    pub id: i64,
    pub op_type: OpType,
    pub target_aggregate_id: i64,
    pub secondary_aggregate_id: Option<i64>,
    /// Comma-joined observation ids the operation touched
    pub affected_observation_ids: String,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OpsLogEntry {
    /// Parse `affected_observation_ids` back into ids
    pub fn affected_ids(&self) -> Vec<i64> {
        self.affected_observation_ids
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }
}

/// An SMS notification handed over by the device inbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsMessage {
    pub id: i64,
    pub sender: String,
    pub body: String,
    pub date_millis: i64,
}

/// One extraction pattern within an SMS profile
///
/// `direction` is declarative data (e.g. "DEBIT"); an unparsable value is
/// treated as unknown at match time. Capture group indices are 1-based,
/// index 0 being the whole match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsPattern {
    pub name: String,
    pub pattern: String,
    pub direction: String,
    pub amount_group: usize,
    #[serde(default)]
    pub reference_group: Option<usize>,
    #[serde(default)]
    pub counterparty_group: Option<usize>,
    #[serde(default)]
    pub account_hint_group: Option<usize>,
}

/// A prioritized, declarative SMS matching profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsProfile {
    pub id: i64,
    pub name: String,
    pub priority: i32,
    pub enabled: bool,
    /// Empty list means the profile matches on body content alone
    #[serde(default)]
    pub sender_addresses: Vec<String>,
    pub currency: String,
    pub patterns: Vec<SmsPattern>,
}

/// User-confirmed column mapping for a CSV import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub date_column: usize,
    #[serde(default)]
    pub amount_column: Option<usize>,
    #[serde(default)]
    pub debit_column: Option<usize>,
    #[serde(default)]
    pub credit_column: Option<usize>,
    #[serde(default)]
    pub description_column: Option<usize>,
    #[serde(default)]
    pub reference_column: Option<usize>,
    /// Primary chrono format string; the fallback list is tried after it
    #[serde(default)]
    pub date_format: Option<String>,
    pub currency: String,
}

/// Headers, sample rows and a best-effort mapping suggestion for a CSV file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvPreview {
    pub delimiter: char,
    pub headers: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    pub suggested_mapping: Option<ColumnMapping>,
}

/// A row the parser could not turn into an observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseRowError {
    pub row_index: usize,
    pub message: String,
}

/// Boundary summary returned by every import operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub session_id: i64,
    pub total: i64,
    pub imported: i64,
    pub skipped: i64,
    pub failed: i64,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_compatibility() {
        assert!(Direction::Debit.compatible_with(Direction::Debit));
        assert!(Direction::Debit.compatible_with(Direction::Unknown));
        assert!(Direction::Unknown.compatible_with(Direction::Credit));
        assert!(!Direction::Debit.compatible_with(Direction::Credit));
        assert!(!Direction::Mixed.compatible_with(Direction::Debit));
    }

    #[test]
    fn seal_coerces_mixed_direction() {
        let obs = NewObservation {
            source_type: SourceType::Sms,
            source_locator: "MPESA".into(),
            raw_payload: "body".into(),
            amount_minor: 100,
            currency: "KES".into(),
            timestamp: None,
            timestamp_date_only: false,
            direction: Direction::Mixed,
            reference: None,
            counterparty: None,
            account_hint: None,
            parse_confidence: 0.85,
            content_hash: String::new(),
            fp_ref: None,
            fp_amt_time: None,
            fp_amt_day: None,
            fp_sender_amt: String::new(),
        }
        .seal();
        assert_eq!(obs.direction, Direction::Unknown);
        assert!(!obs.content_hash.is_empty());
        assert_eq!(obs.fp_sender_amt, "sa:MPESA:100");
    }

    #[test]
    fn ops_entry_parses_affected_ids() {
        let entry = OpsLogEntry {
            id: 1,
            op_type: OpType::Merge,
            target_aggregate_id: 1,
            secondary_aggregate_id: Some(2),
            affected_observation_ids: "3, 4,5".into(),
            field_name: None,
            old_value: None,
            new_value: None,
            created_at: Utc::now(),
        };
        assert_eq!(entry.affected_ids(), vec![3, 4, 5]);
    }
}
