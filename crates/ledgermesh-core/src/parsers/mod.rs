//! Source parsers: SMS regex profiles, column-mapped CSV, PDF statement
//! tables. Each parser emits [`NewObservation`]s with derived keys already
//! sealed; row-level failures are collected, never fatal.
//!
//! [`NewObservation`]: crate::models::NewObservation

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

pub mod csv;
pub mod pdf;
pub mod sms;

/// Parse a decimal amount into minor units exactly.
///
/// Commas and surrounding whitespace are stripped, an optional sign is
/// honored, and anything past two decimal places is truncated. Working on
/// the digits directly avoids binary-float drift on values like `8.29`.
pub(crate) fn parse_amount_minor(text: &str) -> Option<i64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    let (sign, rest) = match cleaned.strip_prefix('-') {
        Some(r) => (-1_i64, r),
        None => (1_i64, cleaned.strip_prefix('+').unwrap_or(cleaned.as_str())),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, f),
        None => (rest, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let mut frac_digits: String = frac_part.chars().take(2).collect();
    while frac_digits.len() < 2 {
        frac_digits.push('0');
    }
    let frac_val: i64 = frac_digits.parse().ok()?;
    Some(sign * int_val.checked_mul(100)?.checked_add(frac_val)?)
}

/// Epoch millis for noon local time on the given date, the stand-in moment
/// for date-only sources
pub(crate) fn local_noon_millis(date: NaiveDate) -> i64 {
    let ndt = date
        .and_hms_opt(12, 0, 0)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN));
    local_millis(ndt)
}

/// Epoch millis for a naive local datetime, tolerating DST gaps
pub(crate) fn local_millis(ndt: NaiveDateTime) -> i64 {
    Local
        .from_local_datetime(&ndt)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| ndt.and_utc().timestamp_millis())
}
