//! PDF statement parser: text extraction plus table heuristics
//!
//! Only digital text-bearing PDFs are supported. The extracted text is
//! scanned for header lines, a column layout is measured from the header's
//! keyword offsets, and the rows below are accumulated with a small state
//! machine that tolerates multi-line descriptions.

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, warn};

use super::{local_noon_millis, parse_amount_minor};
use crate::error::{Error, Result};
use crate::models::{Direction, NewObservation, ParseRowError, SourceType};

/// Confidence assigned to every successful PDF extraction
const PDF_PARSE_CONFIDENCE: f64 = 0.7;

/// Minimum readable characters per page before a file counts as scanned
const MIN_CHARS_PER_PAGE: usize = 20;

/// Consecutive blank lines that end a table
const MAX_BLANK_RUN: usize = 3;

/// A header line must mention at least this many table keywords
const MIN_HEADER_KEYWORDS: usize = 2;

/// Column offset guessed for descriptions when the header lacks one
const DESCRIPTION_FALLBACK_GAP: usize = 12;

const HEADER_KEYWORDS: [&str; 15] = [
    "date",
    "description",
    "narration",
    "particulars",
    "details",
    "debit",
    "credit",
    "amount",
    "withdrawal",
    "deposit",
    "balance",
    "reference",
    "ref",
    "value",
    "transaction",
];

const STOP_PREFIXES: [&str; 8] = [
    "total",
    "closing balance",
    "opening balance",
    "statement summary",
    "page total",
    "brought forward",
    "carried forward",
    "end of statement",
];

const DATE_FORMATS: [&str; 14] = [
    "%d/%m/%Y",
    "%d/%m/%y",
    "%d-%m-%Y",
    "%d-%m-%y",
    "%Y-%m-%d",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%b %d, %Y",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%d %b %y",
];

pub struct PdfParseResult {
    pub observations: Vec<NewObservation>,
    pub errors: Vec<ParseRowError>,
}

/// Measured character offsets of the table columns in a header line
struct ColumnLayout {
    date_offset: usize,
    description_offset: usize,
    debit_offset: Option<usize>,
    credit_offset: Option<usize>,
    balance_offset: Option<usize>,
}

/// Accumulated state for the row under construction
struct RowState {
    date: NaiveDate,
    line_index: usize,
    raw_lines: Vec<String>,
    description: Vec<String>,
    amount_minor: Option<i64>,
    direction: Option<Direction>,
    reference: Option<String>,
}

impl RowState {
    fn new(date: NaiveDate, line_index: usize) -> Self {
        Self {
            date,
            line_index,
            raw_lines: Vec::new(),
            description: Vec::new(),
            amount_minor: None,
            direction: None,
            reference: None,
        }
    }
}

/// Parse a statement PDF into observations.
///
/// Fails outright for password-protected files and for image-only scans
/// (detected by a too-low readable-character density); row-level problems
/// are collected per table instead.
pub fn parse(data: &[u8], locator: &str, currency: &str) -> Result<PdfParseResult> {
    let text = extract_text(data)?;

    let page_count = text
        .split('\u{000C}')
        .filter(|p| !p.trim().is_empty())
        .count()
        .max(1);
    let readable = text.chars().filter(|c| !c.is_whitespace()).count();
    if readable < page_count * MIN_CHARS_PER_PAGE {
        return Err(Error::ScannedPdf(format!(
            "{} readable characters across {} pages",
            readable, page_count
        )));
    }

    let result = parse_statement_text(&text, locator, currency)?;
    debug!(
        observations = result.observations.len(),
        errors = result.errors.len(),
        pages = page_count,
        "parsed PDF"
    );
    Ok(result)
}

/// Run the table heuristics over already-extracted statement text
fn parse_statement_text(text: &str, locator: &str, currency: &str) -> Result<PdfParseResult> {
    let amount_re = Regex::new(r"[\d,]+\.\d{2}")?;
    let suffix_re = Regex::new(r"(?i)([\d,]+\.\d{2})\s*(DR|CR)\b")?;
    let reference_re = Regex::new(r"[A-Z]{2,4}\d{8,16}")?;

    let lines: Vec<&str> = text.lines().collect();
    let mut observations = Vec::new();
    let mut errors = Vec::new();

    let mut i = 0;
    let mut last_header: Option<usize> = None;
    while i < lines.len() {
        let near_previous = last_header.is_some_and(|h| i > h && i - h <= MAX_BLANK_RUN);
        if !near_previous && is_header_line(lines[i]) {
            last_header = Some(i);
            match detect_layout(lines[i]) {
                Some(layout) => {
                    i = parse_table(
                        &lines,
                        i + 1,
                        &layout,
                        locator,
                        currency,
                        &amount_re,
                        &suffix_re,
                        &reference_re,
                        &mut observations,
                        &mut errors,
                    );
                    continue;
                }
                None => {
                    debug!(line = i, "header without a date column, table discarded");
                }
            }
        }
        i += 1;
    }

    Ok(PdfParseResult {
        observations,
        errors,
    })
}

fn extract_text(data: &[u8]) -> Result<String> {
    match pdf_extract::extract_text_from_mem(data) {
        Ok(text) => Ok(text),
        Err(e) => {
            let message = e.to_string();
            let lowered = message.to_lowercase();
            if lowered.contains("encrypt") || lowered.contains("password") {
                Err(Error::EncryptedPdf)
            } else {
                warn!("PDF text extraction failed");
                Err(Error::Import(format!("PDF text extraction failed: {}", message)))
            }
        }
    }
}

/// A line counts as a header when it mentions enough distinct table
/// keywords. "ref" only counts when "reference" is not the word matched.
fn is_header_line(line: &str) -> bool {
    let lc = line.to_lowercase();
    let mut count = 0;
    for keyword in HEADER_KEYWORDS {
        if keyword == "ref" && lc.contains("reference") {
            continue;
        }
        if lc.contains(keyword) {
            count += 1;
        }
    }
    count >= MIN_HEADER_KEYWORDS
}

fn find_first(lc: &str, names: &[&str]) -> Option<usize> {
    names.iter().filter_map(|n| lc.find(n)).min()
}

fn detect_layout(header_line: &str) -> Option<ColumnLayout> {
    let lc = header_line.to_lowercase();

    let date_offset = find_first(&lc, &["value date", "txn date", "date"])?;
    let description_offset =
        find_first(&lc, &["description", "narration", "particulars", "details"])
            .unwrap_or(date_offset + DESCRIPTION_FALLBACK_GAP);

    Some(ColumnLayout {
        date_offset,
        description_offset,
        debit_offset: find_first(&lc, &["debit", "withdrawal"]),
        credit_offset: find_first(&lc, &["credit", "deposit"]),
        balance_offset: lc.find("balance"),
    })
}

/// Try to read a date from the first one to three whitespace tokens
fn parse_leading_date(line: &str) -> Option<NaiveDate> {
    let tokens: Vec<&str> = line.split_whitespace().take(3).collect();
    for n in 1..=tokens.len() {
        let candidate = tokens[..n].join(" ");
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(&candidate, format) {
                return Some(date);
            }
        }
    }
    None
}

/// Walk the lines below a header, accumulating rows until the table ends.
/// Returns the index of the first line after the table.
#[allow(clippy::too_many_arguments)]
fn parse_table(
    lines: &[&str],
    start: usize,
    layout: &ColumnLayout,
    locator: &str,
    currency: &str,
    amount_re: &Regex,
    suffix_re: &Regex,
    reference_re: &Regex,
    observations: &mut Vec<NewObservation>,
    errors: &mut Vec<ParseRowError>,
) -> usize {
    let mut state: Option<RowState> = None;
    let mut blanks = 0;
    let mut i = start;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            blanks += 1;
            if blanks >= MAX_BLANK_RUN {
                flush(state.take(), locator, currency, observations, errors);
                return i + 1;
            }
            i += 1;
            continue;
        }
        blanks = 0;

        let lc = trimmed.to_lowercase();
        if STOP_PREFIXES.iter().any(|p| lc.starts_with(p)) {
            flush(state.take(), locator, currency, observations, errors);
            return i + 1;
        }

        if let Some(date) = parse_leading_date(trimmed) {
            flush(state.take(), locator, currency, observations, errors);
            let mut row = RowState::new(date, i);
            ingest_line(line, layout, amount_re, suffix_re, reference_re, &mut row);
            state = Some(row);
        } else if let Some(row) = state.as_mut() {
            ingest_line(line, layout, amount_re, suffix_re, reference_re, row);
        }
        i += 1;
    }

    flush(state.take(), locator, currency, observations, errors);
    lines.len()
}

/// Fold one physical line into the row under construction
fn ingest_line(
    line: &str,
    layout: &ColumnLayout,
    amount_re: &Regex,
    suffix_re: &Regex,
    reference_re: &Regex,
    row: &mut RowState,
) {
    row.raw_lines.push(line.to_string());

    if row.reference.is_none() {
        if let Some(m) = reference_re.find(line) {
            row.reference = Some(m.as_str().to_string());
        }
    }

    let mut matches: Vec<(usize, i64)> = amount_re
        .find_iter(line)
        .filter_map(|m| parse_amount_minor(m.as_str()).map(|v| (m.start(), v)))
        .collect();

    // The description sits between its column offset and the first amount
    let description_end = matches
        .first()
        .map(|(pos, _)| *pos)
        .unwrap_or(line.len());
    if let Some(part) = slice_lossy(line, layout.description_offset, description_end) {
        let part = part.trim();
        if !part.is_empty() {
            row.description.push(part.to_string());
        }
    }

    if row.amount_minor.is_some() || matches.is_empty() {
        return;
    }

    // An explicit DR/CR suffix names the direction outright
    if let Some(caps) = suffix_re.captures(line) {
        if let Some(amount) = caps.get(1).and_then(|m| parse_amount_minor(m.as_str())) {
            row.amount_minor = Some(amount.abs());
            row.direction = Some(
                if caps
                    .get(2)
                    .map(|m| m.as_str().eq_ignore_ascii_case("CR"))
                    .unwrap_or(false)
                {
                    Direction::Credit
                } else {
                    Direction::Debit
                },
            );
            return;
        }
    }

    // With a balance column, the last amount on the line is the running
    // balance, not the transaction
    if layout.balance_offset.is_some() && matches.len() >= 2 {
        matches.pop();
    }
    let Some(&(pos, value)) = matches.first() else {
        return;
    };
    row.amount_minor = Some(value.abs());

    row.direction = Some(match (layout.debit_offset, layout.credit_offset) {
        (Some(debit), Some(credit)) => {
            let debit_distance = pos.abs_diff(debit);
            let credit_distance = pos.abs_diff(credit);
            if debit_distance <= credit_distance {
                Direction::Debit
            } else {
                Direction::Credit
            }
        }
        // Single-amount layouts list charges; default to debit
        _ => Direction::Debit,
    });
}

/// Byte-safe substring that tolerates short lines and multibyte text
fn slice_lossy(line: &str, start: usize, end: usize) -> Option<&str> {
    if start >= end || start >= line.len() {
        return None;
    }
    let end = end.min(line.len());
    let start = (start..=end).find(|&i| line.is_char_boundary(i))?;
    let end = (start..=end).rev().find(|&i| line.is_char_boundary(i))?;
    line.get(start..end)
}

fn flush(
    state: Option<RowState>,
    locator: &str,
    currency: &str,
    observations: &mut Vec<NewObservation>,
    errors: &mut Vec<ParseRowError>,
) {
    let Some(row) = state else {
        return;
    };
    let Some(amount_minor) = row.amount_minor else {
        errors.push(ParseRowError {
            row_index: row.line_index,
            message: "no amount found for dated row".to_string(),
        });
        return;
    };

    let description = row.description.join(" ").trim().to_string();
    observations.push(
        NewObservation {
            source_type: SourceType::Pdf,
            source_locator: locator.to_string(),
            raw_payload: row.raw_lines.join("\n"),
            amount_minor,
            currency: currency.to_string(),
            timestamp: Some(local_noon_millis(row.date)),
            timestamp_date_only: true,
            direction: row.direction.unwrap_or(Direction::Debit),
            reference: row.reference,
            counterparty: if description.is_empty() {
                None
            } else {
                Some(description)
            },
            account_hint: None,
            parse_confidence: PDF_PARSE_CONFIDENCE,
            content_hash: String::new(),
            fp_ref: None,
            fp_amt_time: None,
            fp_amt_day: None,
            fp_sender_amt: String::new(),
        }
        .seal(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_text(text: &str, locator: &str, currency: &str) -> Result<PdfParseResult> {
        parse_statement_text(text, locator, currency)
    }

    const STATEMENT: &str = "\
ACME BANK LIMITED
Account statement for 0012345678

Date        Description                  Debit      Credit     Balance
01/03/2026  POS PURCHASE COFFEE          4.50                  995.50
            CARD 1234 REF AB1234567890
02/03/2026  SALARY CREDIT                           2,500.00   3,495.50
03/03/2026  ATM WITHDRAWAL               200.00                3,295.50
Closing Balance                                                3,295.50
";

    #[test]
    fn statement_rows_parse_with_directions() {
        let result = parse_text(STATEMENT, "statement.pdf", "USD").unwrap();
        assert_eq!(result.errors, Vec::new());
        assert_eq!(result.observations.len(), 3);

        let purchase = &result.observations[0];
        assert_eq!(purchase.amount_minor, 450);
        assert_eq!(purchase.direction, Direction::Debit);
        assert_eq!(purchase.reference.as_deref(), Some("AB1234567890"));
        assert!(purchase.timestamp_date_only);
        assert!(purchase
            .counterparty
            .as_deref()
            .unwrap()
            .contains("POS PURCHASE COFFEE"));

        let salary = &result.observations[1];
        assert_eq!(salary.amount_minor, 250_000);
        assert_eq!(salary.direction, Direction::Credit);

        let withdrawal = &result.observations[2];
        assert_eq!(withdrawal.amount_minor, 20_000);
        assert_eq!(withdrawal.direction, Direction::Debit);
    }

    #[test]
    fn continuation_lines_extend_the_description() {
        let result = parse_text(STATEMENT, "statement.pdf", "USD").unwrap();
        let purchase = &result.observations[0];
        assert!(purchase
            .counterparty
            .as_deref()
            .unwrap()
            .contains("CARD 1234"));
    }

    #[test]
    fn dr_cr_suffix_wins_over_column_position() {
        let text = "\
Date        Particulars                  Amount       Balance
01/03/2026  REVERSAL FEE                 15.00 CR     1,000.00
";
        let result = parse_text(text, "s.pdf", "USD").unwrap();
        assert_eq!(result.observations.len(), 1);
        assert_eq!(result.observations[0].direction, Direction::Credit);
        assert_eq!(result.observations[0].amount_minor, 1_500);
    }

    #[test]
    fn single_amount_layout_defaults_to_debit() {
        let text = "\
Date        Description        Amount
01/03/2026  SUBSCRIPTION FEE   9.99
";
        let result = parse_text(text, "s.pdf", "USD").unwrap();
        assert_eq!(result.observations.len(), 1);
        assert_eq!(result.observations[0].direction, Direction::Debit);
        assert_eq!(result.observations[0].amount_minor, 999);
    }

    #[test]
    fn summary_prefixes_stop_the_table() {
        let text = "\
Date        Description        Amount
01/03/2026  FEE                1.00
Total                          1.00
02/03/2026  NOT A ROW          2.00
";
        let result = parse_text(text, "s.pdf", "USD").unwrap();
        assert_eq!(result.observations.len(), 1);
    }

    #[test]
    fn three_blank_lines_stop_the_table() {
        let text = "\
Date        Description        Amount
01/03/2026  FEE                1.00



02/03/2026  ORPHAN             2.00
";
        let result = parse_text(text, "s.pdf", "USD").unwrap();
        assert_eq!(result.observations.len(), 1);
    }

    #[test]
    fn header_without_date_column_is_discarded() {
        let text = "\
Description        Amount     Balance
SOMETHING          1.00       2.00
";
        let result = parse_text(text, "s.pdf", "USD").unwrap();
        assert!(result.observations.is_empty());
    }

    #[test]
    fn dated_row_without_amount_is_an_error() {
        let text = "\
Date        Description        Amount
01/03/2026  PENDING ITEM
";
        let result = parse_text(text, "s.pdf", "USD").unwrap();
        assert!(result.observations.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn scanned_pdf_density_check() {
        // parse() rejects before table parsing when the per-page character
        // density is too low; exercised through the public entry point with
        // a stub that never reaches extraction here, so just pin the error
        // rendering the orchestrator relies on.
        let err = Error::ScannedPdf("12 readable characters across 3 pages".to_string());
        assert!(err.to_string().starts_with("scanned PDF detected"));
        assert_eq!(Error::EncryptedPdf.to_string(), "PDF is password-protected");
    }

    #[test]
    fn lone_reference_cell_is_not_a_header() {
        // "reference" contains "ref"; counted once, one keyword is not
        // enough to declare a header
        assert!(!is_header_line("Reference"));
        assert!(is_header_line("Date      Reference      Amount"));
        assert!(is_header_line("Ref No      Debit      Credit"));
    }

    #[test]
    fn date_formats_accept_common_statement_styles() {
        for text in [
            "01/03/2026",
            "01/03/26",
            "2026-03-01",
            "1 Mar 2026",
            "01-Mar-2026",
            "Mar 1, 2026",
            "01.03.2026",
        ] {
            assert!(parse_leading_date(text).is_some(), "failed on {}", text);
        }
        assert!(parse_leading_date("PURCHASE 12.00").is_none());
    }
}
