//! Normalized lookup keys derived from raw observation fields
//!
//! Every fingerprint is an opaque short string with a type prefix so the
//! namespaces stay disjoint. Fingerprints are computed once when an
//! observation is built and denormalized onto the stored row; candidate
//! search only ever compares these strings.

use chrono::{Local, TimeZone};
use sha2::{Digest, Sha256};

use crate::models::SourceType;

/// Milliseconds per time bucket for the amount+time key
const TIME_BUCKET_MS: i64 = 300_000;

/// Reference fingerprint: uppercase, alphanumerics only.
///
/// Blank input, or input with no alphanumeric characters, has no key.
pub fn fp_ref(reference: &str) -> Option<String> {
    if reference.trim().is_empty() {
        return None;
    }
    let normalized: String = reference
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect();
    if normalized.is_empty() {
        None
    } else {
        Some(format!("ref:{}", normalized))
    }
}

/// Amount plus 5-minute time bucket
pub fn fp_amt_time(amount_minor: i64, ts_millis: Option<i64>) -> Option<String> {
    ts_millis.map(|ts| format!("at:{}:{}", amount_minor, ts.div_euclid(TIME_BUCKET_MS)))
}

/// Amount plus local calendar day
///
/// Uses the host's local zone; ingesting the same data under a different
/// zone can bucket day-boundary timestamps differently.
pub fn fp_amt_day(amount_minor: i64, ts_millis: Option<i64>) -> Option<String> {
    let ts = ts_millis?;
    let date = Local
        .timestamp_millis_opt(ts)
        .earliest()
        .map(|dt| dt.date_naive())?;
    Some(format!("ad:{}:{}", amount_minor, date.format("%Y-%m-%d")))
}

/// Sender (or file) label plus amount; always present
pub fn fp_sender_amt(locator: &str, amount_minor: i64) -> String {
    format!("sa:{}:{}", locator.trim().to_uppercase(), amount_minor)
}

/// Deduplication key: SHA-256 over `source_type | locator | raw_payload`
/// with a literal `|` separator, lowercase hex.
pub fn content_hash(source_type: SourceType, locator: &str, raw_payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(locator.as_bytes());
    hasher.update(b"|");
    hasher.update(raw_payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_fingerprint_normalizes() {
        assert_eq!(fp_ref("txn-42 "), Some("ref:TXN42".to_string()));
        assert_eq!(fp_ref("  "), None);
        assert_eq!(fp_ref("---"), None);
        assert_eq!(fp_ref("abc123"), Some("ref:ABC123".to_string()));
    }

    #[test]
    fn amt_time_buckets_five_minutes() {
        assert_eq!(fp_amt_time(5000, None), None);
        // 1735689600000 / 300000 = 5785632
        assert_eq!(
            fp_amt_time(5000, Some(1_735_689_600_000)),
            Some("at:5000:5785632".to_string())
        );
        // 299_999 ms later lands in the same bucket
        assert_eq!(
            fp_amt_time(5000, Some(1_735_689_600_000 + 299_999)),
            Some("at:5000:5785632".to_string())
        );
        assert_eq!(
            fp_amt_time(5000, Some(1_735_689_600_000 + 300_000)),
            Some("at:5000:5785633".to_string())
        );
    }

    #[test]
    fn amt_day_requires_timestamp() {
        assert_eq!(fp_amt_day(100, None), None);
        let fp = fp_amt_day(100, Some(1_735_689_600_000)).unwrap();
        assert!(fp.starts_with("ad:100:"));
        // YYYY-MM-DD tail
        let date_part = fp.rsplit(':').next().unwrap();
        assert_eq!(date_part.len(), 10);
    }

    #[test]
    fn sender_amt_always_present() {
        assert_eq!(fp_sender_amt(" mpesa ", 100), "sa:MPESA:100");
    }

    #[test]
    fn content_hash_is_stable_lowercase_hex() {
        let a = content_hash(SourceType::Sms, "MPESA", "hello");
        let b = content_hash(SourceType::Sms, "MPESA", "hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // Different source type must change the hash
        assert_ne!(a, content_hash(SourceType::Csv, "MPESA", "hello"));
    }

    #[test]
    fn content_hash_matches_known_vector() {
        // sha256("SMS|MPESA|RC1 Confirmed. Ksh100.00 paid to X on 1/1/26 at 9:00 AM")
        let payload = "RC1 Confirmed. Ksh100.00 paid to X on 1/1/26 at 9:00 AM";
        let hash = content_hash(SourceType::Sms, "MPESA", payload);
        let mut hasher = Sha256::new();
        hasher.update(format!("SMS|MPESA|{}", payload).as_bytes());
        assert_eq!(hash, hex::encode(hasher.finalize()));
    }
}
