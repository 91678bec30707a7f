//! Canonical projection: observations in, display fields out
//!
//! A pure function with stable tie-breaks. The input is sorted by
//! observation id before anything else, so the output is invariant under
//! permutation and re-projection is idempotent.

use crate::models::{Direction, Observation, Projection, SourceType};

/// How much weight a source's sighting carries when amounts disagree.
/// Statement-grade sources outrank SMS notifications.
pub fn source_priority(source: SourceType) -> i32 {
    match source {
        SourceType::Pdf | SourceType::Csv | SourceType::Xlsx => 3,
        SourceType::Sms => 1,
    }
}

/// Project canonical fields from a set of observations.
///
/// Returns `None` for an empty set; an aggregate always has at least one
/// link, so callers treat that as corrupted state.
pub fn project(observations: &[Observation]) -> Option<Projection> {
    if observations.is_empty() {
        return None;
    }

    let mut obs: Vec<&Observation> = observations.iter().collect();
    obs.sort_by_key(|o| o.id);

    let amount_minor = pick_amount(&obs);
    let currency = pick_most_frequent(obs.iter().map(|o| o.currency.as_str()))?.to_string();
    let timestamp = pick_timestamp(&obs);
    let is_approx_time = obs.iter().all(|o| o.timestamp_date_only);
    let direction = pick_direction(&obs);
    let reference = pick_reference(&obs);
    let counterparty = pick_counterparty(&obs);
    let account_hint = pick_account_hint(&obs);
    let confidence_score = confidence(&obs);

    Some(Projection {
        amount_minor,
        currency,
        timestamp,
        is_approx_time,
        direction,
        reference,
        counterparty,
        account_hint,
        confidence_score,
    })
}

/// Largest amount group wins; ties go to the group whose first observation
/// has the highest source priority, then the lowest observation id.
fn pick_amount(obs: &[&Observation]) -> i64 {
    let mut groups: Vec<(i64, Vec<&Observation>)> = Vec::new();
    for o in obs {
        match groups.iter_mut().find(|(amount, _)| *amount == o.amount_minor) {
            Some((_, members)) => members.push(o),
            None => groups.push((o.amount_minor, vec![o])),
        }
    }
    groups
        .iter()
        .max_by(|a, b| {
            a.1.len()
                .cmp(&b.1.len())
                .then_with(|| {
                    source_priority(a.1[0].source_type).cmp(&source_priority(b.1[0].source_type))
                })
                .then_with(|| b.1[0].id.cmp(&a.1[0].id))
        })
        .map(|(amount, _)| *amount)
        .unwrap_or(0)
}

/// Most frequent value; ties broken by first seen
fn pick_most_frequent<'a>(values: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut groups: Vec<(&str, usize)> = Vec::new();
    for v in values {
        match groups.iter_mut().find(|(value, _)| *value == v) {
            Some((_, count)) => *count += 1,
            None => groups.push((v, 1)),
        }
    }
    groups
        .iter()
        .enumerate()
        .max_by(|(ia, (_, ca)), (ib, (_, cb))| ca.cmp(cb).then_with(|| ib.cmp(ia)))
        .map(|(_, (value, _))| *value)
}

/// The lower median of the sorted non-null timestamps
fn pick_timestamp(obs: &[&Observation]) -> Option<i64> {
    let mut timestamps: Vec<i64> = obs.iter().filter_map(|o| o.timestamp).collect();
    if timestamps.is_empty() {
        return None;
    }
    timestamps.sort_unstable();
    Some(timestamps[timestamps.len() / 2])
}

fn pick_direction(obs: &[&Observation]) -> Direction {
    let mut distinct: Vec<Direction> = Vec::new();
    for o in obs {
        if o.direction != Direction::Unknown && !distinct.contains(&o.direction) {
            distinct.push(o.direction);
        }
    }
    match distinct.len() {
        0 => Direction::Unknown,
        1 => distinct[0],
        _ if distinct.contains(&Direction::Debit) && distinct.contains(&Direction::Credit) => {
            Direction::Mixed
        }
        _ => distinct[0],
    }
}

/// All equal → that value; otherwise the longest, ties to the first seen
fn pick_reference(obs: &[&Observation]) -> Option<String> {
    let refs: Vec<&str> = obs
        .iter()
        .filter_map(|o| o.reference.as_deref())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .collect();
    if refs.is_empty() {
        return None;
    }
    if refs.iter().all(|r| *r == refs[0]) {
        return Some(refs[0].to_string());
    }
    refs.iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.len().cmp(&b.len()).then_with(|| ib.cmp(ia)))
        .map(|(_, r)| r.to_string())
}

/// Largest case-insensitive group, returning the original casing of its
/// first member
fn pick_counterparty(obs: &[&Observation]) -> Option<String> {
    let names: Vec<&str> = obs
        .iter()
        .filter_map(|o| o.counterparty.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    let mut groups: Vec<(String, &str, usize)> = Vec::new();
    for name in names {
        let key = name.to_lowercase();
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, count)) => *count += 1,
            None => groups.push((key, name, 1)),
        }
    }
    groups
        .iter()
        .enumerate()
        .max_by(|(ia, (_, _, ca)), (ib, (_, _, cb))| ca.cmp(cb).then_with(|| ib.cmp(ia)))
        .map(|(_, (_, original, _))| original.to_string())
}

/// Largest case-sensitive group, ties to the first seen
fn pick_account_hint(obs: &[&Observation]) -> Option<String> {
    let hints = obs
        .iter()
        .filter_map(|o| o.account_hint.as_deref())
        .map(str::trim)
        .filter(|h| !h.is_empty());
    pick_most_frequent(hints).map(|h| h.to_string())
}

/// Evidence-agreement score, 0..=100
fn confidence(obs: &[&Observation]) -> i64 {
    let mut score = 0.0_f64;

    let mut sources: Vec<SourceType> = Vec::new();
    for o in obs {
        if !sources.contains(&o.source_type) {
            sources.push(o.source_type);
        }
    }
    score += ((sources.len() as i64) * 15).min(30) as f64;

    let refs: Vec<&str> = obs
        .iter()
        .filter_map(|o| o.reference.as_deref())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .collect();
    if !refs.is_empty() && refs.iter().all(|r| *r == refs[0]) {
        score += 20.0;
    }

    let mut timestamps: Vec<i64> = obs.iter().filter_map(|o| o.timestamp).collect();
    timestamps.sort_unstable();
    match timestamps.len() {
        0 => {}
        1 => score += 10.0,
        n => {
            let span_minutes = (timestamps[n - 1] - timestamps[0]) as f64 / 60_000.0;
            score += if span_minutes < 5.0 {
                20.0
            } else if span_minutes < 60.0 {
                15.0
            } else if span_minutes < 1440.0 {
                10.0
            } else {
                5.0
            };
        }
    }

    let avg_parse: f64 =
        obs.iter().map(|o| o.parse_confidence).sum::<f64>() / obs.len() as f64;
    score += avg_parse * 20.0;

    if obs.iter().all(|o| o.amount_minor == obs[0].amount_minor) {
        score += 10.0;
    }

    score.min(100.0).floor() as i64
}
