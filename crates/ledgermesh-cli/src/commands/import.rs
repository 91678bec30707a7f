//! Import command: CSV, PDF and exported SMS dumps

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ledgermesh_core::models::{ColumnMapping, ImportOutcome, SmsMessage};
use ledgermesh_core::SmsSource;

use super::{build_services, open_db};

/// Stands in when no SMS dump is involved
pub(crate) struct EmptySmsSource;

impl SmsSource for EmptySmsSource {
    fn all(&self) -> ledgermesh_core::Result<Vec<SmsMessage>> {
        Ok(Vec::new())
    }

    fn since(&self, _after_ms: i64) -> ledgermesh_core::Result<Vec<SmsMessage>> {
        Ok(Vec::new())
    }
}

/// Reads a JSON array of messages exported from the device
struct FileSmsSource {
    messages: Vec<SmsMessage>,
}

impl FileSmsSource {
    fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open SMS dump: {}", path.display()))?;
        let messages: Vec<SmsMessage> =
            serde_json::from_reader(file).context("SMS dump is not a JSON array of messages")?;
        Ok(Self { messages })
    }
}

impl SmsSource for FileSmsSource {
    fn all(&self) -> ledgermesh_core::Result<Vec<SmsMessage>> {
        Ok(self.messages.clone())
    }

    fn since(&self, after_ms: i64) -> ledgermesh_core::Result<Vec<SmsMessage>> {
        Ok(self
            .messages
            .iter()
            .filter(|m| m.date_millis > after_ms)
            .cloned()
            .collect())
    }
}

pub fn cmd_import(
    db_path: &Path,
    file: Option<&Path>,
    sms_file: Option<&Path>,
    currency: &str,
    mapping_path: Option<&Path>,
    preview_only: bool,
    no_encrypt: bool,
) -> Result<()> {
    match (file, sms_file) {
        (Some(file), None) => import_file(db_path, file, currency, mapping_path, preview_only, no_encrypt),
        (None, Some(dump)) => import_sms_dump(db_path, dump, no_encrypt),
        _ => bail!("Specify exactly one of --file or --sms-file"),
    }
}

fn import_file(
    db_path: &Path,
    file: &Path,
    currency: &str,
    mapping_path: Option<&Path>,
    preview_only: bool,
    no_encrypt: bool,
) -> Result<()> {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());

    let db = open_db(db_path, no_encrypt)?;
    let services = build_services(db, Arc::new(EmptySmsSource))?;

    match extension.as_str() {
        "csv" | "txt" | "tsv" => {
            let reader = File::open(file)
                .with_context(|| format!("Failed to open file: {}", file.display()))?;
            let preview = services.import.preview_csv(reader, &name)?;

            println!("Delimiter: {:?}", preview.delimiter);
            println!("Headers:   {}", preview.headers.join(" | "));
            for row in &preview.sample_rows {
                println!("           {}", row.join(" | "));
            }

            let mapping = match mapping_path {
                Some(path) => load_mapping(path)?,
                None => match preview.suggested_mapping {
                    Some(mut m) => {
                        m.currency = currency.to_string();
                        m
                    }
                    None => bail!(
                        "Could not suggest a column mapping from the headers; \
                         provide one with --mapping"
                    ),
                },
            };
            println!("Mapping:   {}", serde_json::to_string(&mapping)?);

            if preview_only {
                return Ok(());
            }

            let reader = File::open(file)
                .with_context(|| format!("Failed to open file: {}", file.display()))?;
            let outcome = services.import.import_csv(reader, &name, &mapping)?;
            print_outcome(&outcome);
        }
        "pdf" => {
            if preview_only {
                bail!("--preview applies to CSV files only");
            }
            let data = std::fs::read(file)
                .with_context(|| format!("Failed to read file: {}", file.display()))?;
            let outcome = services.import.import_pdf(&data, &name, currency)?;
            print_outcome(&outcome);
        }
        other => bail!("Unsupported file type: .{} (expected .csv or .pdf)", other),
    }
    Ok(())
}

fn import_sms_dump(db_path: &Path, dump: &Path, no_encrypt: bool) -> Result<()> {
    let source = Arc::new(FileSmsSource::load(dump)?);
    let db = open_db(db_path, no_encrypt)?;
    let services = build_services(db, source)?;

    let outcome = services.import.import_sms_all()?;
    print_outcome(&outcome);
    Ok(())
}

fn load_mapping(path: &Path) -> Result<ColumnMapping> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open mapping: {}", path.display()))?;
    serde_json::from_reader(file).context("Mapping file is not a valid column mapping")
}

fn print_outcome(outcome: &ImportOutcome) {
    println!(
        "Session #{}: {} rows, {} imported, {} duplicates skipped, {} failed",
        outcome.session_id, outcome.total, outcome.imported, outcome.skipped, outcome.failed
    );
    for error in &outcome.errors {
        println!("  {}", error);
    }
}
