//! SMS notification parser driven by declarative regex profiles
//!
//! Profiles are data, not code: an ordered list of patterns with capture
//! group indices. The active list is a single writable slot replaced
//! atomically; imports only ever read it.

use std::sync::{Arc, PoisonError, RwLock};

use regex::{Regex, RegexBuilder};
use tracing::warn;

use super::parse_amount_minor;
use crate::models::{Direction, NewObservation, SmsMessage, SmsPattern, SmsProfile, SourceType};

/// Confidence assigned to every successful SMS extraction
const SMS_PARSE_CONFIDENCE: f64 = 0.85;

/// Outcome of matching one message
#[derive(Debug, Clone)]
pub enum SmsParse {
    Parsed(NewObservation),
    /// No profile produced an observation; carries the profile that was
    /// selected but failed to extract, if any
    Unmatched { profile_id: Option<i64> },
}

impl SmsParse {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

pub struct SmsParser {
    profiles: RwLock<Arc<Vec<SmsProfile>>>,
}

impl SmsParser {
    pub fn new(profiles: Vec<SmsProfile>) -> Self {
        Self {
            profiles: RwLock::new(Arc::new(sorted_by_priority(profiles))),
        }
    }

    /// Atomically replace the active profile list, re-sorted by priority
    pub fn update_profiles(&self, profiles: Vec<SmsProfile>) {
        let mut slot = self
            .profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(sorted_by_priority(profiles));
    }

    /// The active list, highest priority first
    pub fn profiles(&self) -> Arc<Vec<SmsProfile>> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Match one message against the active profiles.
    ///
    /// Sender-addressed profiles are consulted first, in priority order;
    /// content-only profiles (empty sender list) are a fallback. Once a
    /// profile is selected no further profiles are tried.
    pub fn parse(&self, msg: &SmsMessage) -> SmsParse {
        let profiles = self.profiles();
        let active: Vec<&SmsProfile> = profiles.iter().filter(|p| p.enabled).collect();

        let sender_lc = msg.sender.trim().to_lowercase();
        let by_sender = active.iter().copied().find(|p| {
            !p.sender_addresses.is_empty()
                && p.sender_addresses.iter().any(|addr| {
                    let addr = addr.trim().to_lowercase();
                    !addr.is_empty() && (sender_lc == addr || sender_lc.contains(&addr))
                })
        });

        let chosen = by_sender.or_else(|| {
            active.iter().copied().find(|p| {
                p.sender_addresses.is_empty()
                    && p.patterns.iter().any(|pat| {
                        compile(pat)
                            .map(|re| re.is_match(&msg.body))
                            .unwrap_or(false)
                    })
            })
        });

        let Some(profile) = chosen else {
            return SmsParse::Unmatched { profile_id: None };
        };

        for pattern in &profile.patterns {
            // TODO: cache compiled regexes when the profile list is swapped
            let re = match compile(pattern) {
                Ok(re) => re,
                Err(e) => {
                    warn!(profile = %profile.name, pattern = %pattern.name, error = %e,
                        "skipping uncompilable pattern");
                    continue;
                }
            };
            let Some(caps) = re.captures(&msg.body) else {
                continue;
            };
            let Some(amount_text) = caps.get(pattern.amount_group).map(|m| m.as_str()) else {
                continue;
            };
            let Some(amount) = parse_amount_minor(amount_text) else {
                continue;
            };
            if amount == 0 {
                continue;
            }

            let capture = |group: Option<usize>| {
                group
                    .and_then(|i| caps.get(i))
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|s| !s.is_empty())
            };

            let obs = NewObservation {
                source_type: SourceType::Sms,
                source_locator: msg.sender.clone(),
                raw_payload: msg.body.clone(),
                amount_minor: amount.abs(),
                currency: profile.currency.clone(),
                timestamp: Some(msg.date_millis),
                timestamp_date_only: false,
                direction: pattern.direction.parse().unwrap_or(Direction::Unknown),
                reference: capture(pattern.reference_group),
                counterparty: capture(pattern.counterparty_group),
                account_hint: capture(pattern.account_hint_group)
                    .or_else(|| Some(profile.name.clone())),
                parse_confidence: SMS_PARSE_CONFIDENCE,
                content_hash: String::new(),
                fp_ref: None,
                fp_amt_time: None,
                fp_amt_day: None,
                fp_sender_amt: String::new(),
            }
            .seal();
            return SmsParse::Parsed(obs);
        }

        SmsParse::Unmatched {
            profile_id: Some(profile.id),
        }
    }
}

fn sorted_by_priority(mut profiles: Vec<SmsProfile>) -> Vec<SmsProfile> {
    profiles.sort_by(|a, b| b.priority.cmp(&a.priority));
    profiles
}

fn compile(pattern: &SmsPattern) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&pattern.pattern)
        .case_insensitive(true)
        .build()
}

/// Starter profiles for common mobile-money and bank alert formats
pub fn default_profiles() -> Vec<SmsProfile> {
    vec![
        SmsProfile {
            id: 1,
            name: "M-PESA".to_string(),
            priority: 100,
            enabled: true,
            sender_addresses: vec!["MPESA".to_string()],
            currency: "KES".to_string(),
            patterns: vec![
                SmsPattern {
                    name: "paid-to".to_string(),
                    pattern: r"([A-Z0-9]+) Confirmed\.\s*Ksh([\d,]+\.?\d*) paid to (.+?)\son"
                        .to_string(),
                    direction: "DEBIT".to_string(),
                    amount_group: 2,
                    reference_group: Some(1),
                    counterparty_group: Some(3),
                    account_hint_group: None,
                },
                SmsPattern {
                    name: "received-from".to_string(),
                    pattern: r"([A-Z0-9]+) Confirmed\.\s*You have received Ksh([\d,]+\.?\d*) from (.+?)\son"
                        .to_string(),
                    direction: "CREDIT".to_string(),
                    amount_group: 2,
                    reference_group: Some(1),
                    counterparty_group: Some(3),
                    account_hint_group: None,
                },
            ],
        },
        SmsProfile {
            id: 2,
            name: "Generic bank alert".to_string(),
            priority: 10,
            enabled: true,
            sender_addresses: Vec::new(),
            currency: "USD".to_string(),
            patterns: vec![SmsPattern {
                name: "debited".to_string(),
                pattern: r"(?:acct|account)\s*(\w+).*?debited.*?([\d,]+\.\d{2}).*?ref[:\s]*(\w+)"
                    .to_string(),
                direction: "DEBIT".to_string(),
                amount_group: 2,
                reference_group: Some(3),
                counterparty_group: None,
                account_hint_group: Some(1),
            }],
        },
    ]
}
