//! Column-mapped CSV parser
//!
//! Works in two phases: a preview that detects the delimiter and suggests a
//! column mapping from the headers, then a full parse under a confirmed
//! mapping. Row failures are collected and never abort the file.

use std::io::Read;

use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use tracing::debug;

use super::{local_millis, local_noon_millis, parse_amount_minor};
use crate::error::Result;
use crate::models::{
    ColumnMapping, CsvPreview, Direction, NewObservation, ParseRowError, SourceType,
};

/// Confidence assigned to every successful CSV extraction
const CSV_PARSE_CONFIDENCE: f64 = 0.8;

/// How many data rows a preview shows
const PREVIEW_ROWS: usize = 5;

/// Formats tried after the mapping's own, in order. `%d/%m/%Y` accepts
/// single-digit day and month, so it also covers `d/M/yyyy` inputs.
const FALLBACK_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d/%m/%Y %H:%M:%S",
    "%Y/%m/%d",
];

pub struct CsvParseResult {
    pub observations: Vec<NewObservation>,
    pub errors: Vec<ParseRowError>,
}

/// Count candidate delimiters in the first line; the max wins and ties
/// resolve to comma
pub fn detect_delimiter(first_line: &str) -> char {
    let mut best = ',';
    let mut best_count = first_line.matches(',').count();
    for candidate in [';', '\t', '|'] {
        let count = first_line.matches(candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Read headers and a handful of sample rows, and suggest a mapping when
/// the headers give one away
pub fn preview<R: Read>(mut reader: R) -> Result<CsvPreview> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let delimiter = detect_delimiter(content.lines().next().unwrap_or(""));
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let mut sample_rows = Vec::new();
    for record in rdr.records().take(PREVIEW_ROWS) {
        let record = record?;
        sample_rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    let suggested_mapping = suggest_mapping(&headers);
    Ok(CsvPreview {
        delimiter,
        headers,
        sample_rows,
        suggested_mapping,
    })
}

fn suggest_mapping(headers: &[String]) -> Option<ColumnMapping> {
    let mut date = None;
    let mut reference = None;
    let mut description = None;
    let mut debit = None;
    let mut credit = None;
    let mut amount = None;

    for (i, header) in headers.iter().enumerate() {
        let h = header.to_lowercase();
        if date.is_none() && h.contains("date") {
            date = Some(i);
            continue;
        }
        if reference.is_none()
            && (h.contains("ref") || h.contains("transaction id") || h.contains("receipt"))
        {
            reference = Some(i);
            continue;
        }
        if description.is_none()
            && (h.contains("desc")
                || h.contains("detail")
                || h.contains("narration")
                || h.contains("particular"))
        {
            description = Some(i);
            continue;
        }
        if debit.is_none() && (h.contains("debit") || h.contains("withdrawal")) {
            debit = Some(i);
            continue;
        }
        if credit.is_none() && (h.contains("credit") || h.contains("deposit")) {
            credit = Some(i);
            continue;
        }
        if amount.is_none() && (h.contains("amount") || h.contains("value")) {
            amount = Some(i);
        }
    }

    let date_column = date?;
    // A signed amount column only stands in when no debit/credit pair exists
    let amount_column = if debit.is_none() && credit.is_none() {
        amount
    } else {
        None
    };

    Some(ColumnMapping {
        date_column,
        amount_column,
        debit_column: debit,
        credit_column: credit,
        description_column: description,
        reference_column: reference,
        date_format: None,
        currency: "USD".to_string(),
    })
}

/// Parse a whole file under a confirmed mapping
pub fn parse<R: Read>(
    mut reader: R,
    locator: &str,
    mapping: &ColumnMapping,
) -> Result<CsvParseResult> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let delimiter = detect_delimiter(content.lines().next().unwrap_or(""));
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut observations = Vec::new();
    let mut errors = Vec::new();

    for (row_index, record) in rdr.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors.push(ParseRowError {
                    row_index,
                    message: format!("malformed row: {}", e),
                });
                continue;
            }
        };
        let cell = |col: usize| record.get(col).unwrap_or("").trim();

        let date_text = cell(mapping.date_column);
        if date_text.is_empty() {
            continue;
        }

        let Some((timestamp, date_only)) =
            parse_timestamp(date_text, mapping.date_format.as_deref())
        else {
            errors.push(ParseRowError {
                row_index,
                message: format!("unparsable date: {}", date_text),
            });
            continue;
        };

        let (amount_minor, direction) = if let Some(col) = mapping.amount_column {
            let text = cell(col);
            let Some(signed) = parse_amount_minor(text) else {
                errors.push(ParseRowError {
                    row_index,
                    message: format!("unparsable amount: {}", text),
                });
                continue;
            };
            if signed == 0 {
                continue;
            }
            let direction = if signed < 0 {
                Direction::Debit
            } else {
                Direction::Credit
            };
            (signed.abs(), direction)
        } else {
            let debit = mapping
                .debit_column
                .map(|c| parse_amount_minor(cell(c)).unwrap_or(0))
                .unwrap_or(0);
            let credit = mapping
                .credit_column
                .map(|c| parse_amount_minor(cell(c)).unwrap_or(0))
                .unwrap_or(0);
            if debit != 0 {
                (debit.abs(), Direction::Debit)
            } else if credit != 0 {
                (credit.abs(), Direction::Credit)
            } else {
                continue;
            }
        };

        let text_cell = |col: Option<usize>| {
            col.map(|c| cell(c).to_string()).filter(|s| !s.is_empty())
        };

        let raw_payload = record
            .iter()
            .collect::<Vec<_>>()
            .join(&delimiter.to_string());

        observations.push(
            NewObservation {
                source_type: SourceType::Csv,
                source_locator: locator.to_string(),
                raw_payload,
                amount_minor,
                currency: mapping.currency.clone(),
                timestamp: Some(timestamp),
                timestamp_date_only: date_only,
                direction,
                reference: text_cell(mapping.reference_column),
                counterparty: text_cell(mapping.description_column),
                account_hint: None,
                parse_confidence: CSV_PARSE_CONFIDENCE,
                content_hash: String::new(),
                fp_ref: None,
                fp_amt_time: None,
                fp_amt_day: None,
                fp_sender_amt: String::new(),
            }
            .seal(),
        );
    }

    debug!(
        observations = observations.len(),
        errors = errors.len(),
        "parsed CSV"
    );
    Ok(CsvParseResult {
        observations,
        errors,
    })
}

/// Parse a date cell into epoch millis plus a date-only flag.
///
/// The mapping's own format is tried first, then the fallback list. A
/// pure-date parse stands in as noon local time.
fn parse_timestamp(text: &str, primary_format: Option<&str>) -> Option<(i64, bool)> {
    let date_only = !has_time_indicator(text);
    let formats = primary_format
        .into_iter()
        .chain(FALLBACK_FORMATS.iter().copied());

    for format in formats {
        if format.contains("%H") {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(text, format) {
                return Some((local_millis(ndt), date_only));
            }
        } else if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some((local_noon_millis(date), date_only));
        }
    }
    None
}

/// A time indicator is an ISO `T` separator or a colon preceded by a digit
fn has_time_indicator(s: &str) -> bool {
    if s.contains('T') || s.contains('t') {
        return true;
    }
    s.as_bytes()
        .windows(2)
        .any(|w| w[1] == b':' && w[0].is_ascii_digit())
}
