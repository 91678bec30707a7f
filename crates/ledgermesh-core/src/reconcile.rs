//! Reconciliation engine: bind unlinked observations to aggregates
//!
//! Each pass walks the unlinked observations in id order, probes for
//! candidate aggregates through the denormalized fingerprints, scores them,
//! and either merges into the winner or seeds a fresh aggregate. The id
//! ordering makes the resulting topology a function of the observation
//! population alone, not of storage order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::clock::Clock;
use crate::config::ReconcilerConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Aggregate, Observation};
use crate::projector::project;

/// Why a candidate aggregate was considered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchReason {
    ReferenceMatch,
    AmountDayMatch,
}

#[derive(Debug)]
struct Candidate {
    aggregate_id: i64,
    score: i32,
    /// Absolute timestamp distance; None sorts last
    timestamp_distance: Option<i64>,
    reason: MatchReason,
}

/// Counters from one reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub processed: usize,
    pub linked: usize,
    pub created: usize,
}

/// The engine; built once and shared by handle
pub struct Reconciler {
    db: Database,
    config: ReconcilerConfig,
    clock: Arc<dyn Clock>,
    /// Single named job slot; at most one pass runs per process
    slot: Mutex<()>,
}

impl Reconciler {
    pub fn new(db: Database, config: ReconcilerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            db,
            config,
            clock,
            slot: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Aggregates whose confidence falls strictly below the configured
    /// threshold, for human review
    pub fn review_queue(&self) -> Result<Vec<Aggregate>> {
        self.db.get_review_queue(self.config.confidence_threshold)
    }

    /// Process every currently unlinked observation, in id order.
    ///
    /// Rerunning with no new unlinked observations is a no-op. Waits for an
    /// in-flight pass to finish before starting; back-to-back passes are
    /// idempotent, so a superseded request costs nothing.
    pub fn reconcile_all(&self) -> Result<ReconcileOutcome> {
        self.run(None)
    }

    /// Like [`reconcile_all`](Self::reconcile_all) but checks the cancel
    /// token between observations. A cancelled pass leaves every already
    /// processed observation durably linked.
    pub fn reconcile_all_cancellable(&self, cancel: &AtomicBool) -> Result<ReconcileOutcome> {
        self.run(Some(cancel))
    }

    fn run(&self, cancel: Option<&AtomicBool>) -> Result<ReconcileOutcome> {
        let _slot = self
            .slot
            .lock()
            .map_err(|_| Error::InvalidData("reconcile slot poisoned".to_string()))?;

        let unlinked = self.db.get_unlinked_observations()?;
        let mut outcome = ReconcileOutcome::default();

        for obs in &unlinked {
            if let Some(token) = cancel {
                if token.load(Ordering::Relaxed) {
                    debug!(processed = outcome.processed, "reconcile pass cancelled");
                    break;
                }
            }
            if self.reconcile_one(obs)? {
                outcome.linked += 1;
            } else {
                outcome.created += 1;
            }
            outcome.processed += 1;
        }

        debug!(
            processed = outcome.processed,
            linked = outcome.linked,
            created = outcome.created,
            "reconcile pass complete"
        );
        Ok(outcome)
    }

    /// Returns true when the observation was linked to an existing
    /// aggregate, false when a fresh one was created.
    fn reconcile_one(&self, obs: &Observation) -> Result<bool> {
        let candidates = self.find_candidates(obs)?;
        let winner = select_winner(candidates);
        let now = self.clock.now_utc();

        match winner {
            Some(candidate) => {
                let aggregate_id = candidate.aggregate_id;
                let mut set = self.db.get_observations_for_aggregate(aggregate_id)?;
                if !set.iter().any(|o| o.id == obs.id) {
                    set.push(obs.clone());
                }
                let proj = project(&set).ok_or_else(|| {
                    Error::InvalidData(format!("aggregate {} has no observations", aggregate_id))
                })?;
                self.db.attach_observation(aggregate_id, obs.id, &proj, now)?;
                debug!(
                    observation = obs.id,
                    aggregate = aggregate_id,
                    reason = ?candidate.reason,
                    score = candidate.score,
                    "linked observation"
                );
                Ok(true)
            }
            None => {
                let proj = project(std::slice::from_ref(obs)).ok_or_else(|| {
                    Error::InvalidData("cannot project an empty observation set".to_string())
                })?;
                let aggregate_id =
                    self.db.create_aggregate_for_observation(obs.id, &proj, now)?;
                debug!(observation = obs.id, aggregate = aggregate_id, "created aggregate");
                Ok(false)
            }
        }
    }

    fn find_candidates(&self, obs: &Observation) -> Result<Vec<Candidate>> {
        let mut candidates: Vec<Candidate> = Vec::new();

        // Reference probe: strongest evidence, currency must agree
        if let Some(fp) = &obs.fp_ref {
            for agg in self.db.find_candidate_aggregates_by_fp_ref(fp)? {
                if agg.currency != obs.currency {
                    continue;
                }
                let delta = (agg.amount_minor - obs.amount_minor).abs();
                let score = if delta == 0 {
                    100
                } else if delta <= self.config.amount_tolerance_cents {
                    85
                } else {
                    80
                };
                candidates.push(Candidate {
                    aggregate_id: agg.id,
                    score,
                    timestamp_distance: timestamp_distance(&agg, obs),
                    reason: MatchReason::ReferenceMatch,
                });
            }
        }

        // Amount+day probe: weaker, so currency, direction and time window
        // must all agree
        if let Some(fp) = &obs.fp_amt_day {
            for agg in self.db.find_candidate_aggregates_by_fp_amt_day(fp)? {
                if candidates.iter().any(|c| c.aggregate_id == agg.id) {
                    continue;
                }
                if agg.currency != obs.currency {
                    continue;
                }
                if !agg.direction.compatible_with(obs.direction) {
                    continue;
                }
                let distance = match timestamp_distance(&agg, obs) {
                    Some(d) if d < self.config.time_window_millis() => Some(d),
                    _ => continue,
                };
                candidates.push(Candidate {
                    aggregate_id: agg.id,
                    score: 60,
                    timestamp_distance: distance,
                    reason: MatchReason::AmountDayMatch,
                });
            }
        }

        Ok(candidates)
    }
}

fn timestamp_distance(agg: &Aggregate, obs: &Observation) -> Option<i64> {
    match (agg.timestamp, obs.timestamp) {
        (Some(a), Some(b)) => Some((a - b).abs()),
        _ => None,
    }
}

/// Highest score first, then closest in time (unknown distance last),
/// then lowest aggregate id
fn select_winner(mut candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| {
                let da = a.timestamp_distance.unwrap_or(i64::MAX);
                let db = b.timestamp_distance.unwrap_or(i64::MAX);
                da.cmp(&db)
            })
            .then_with(|| a.aggregate_id.cmp(&b.aggregate_id))
    });
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64, score: i32, distance: Option<i64>) -> Candidate {
        Candidate {
            aggregate_id: id,
            score,
            timestamp_distance: distance,
            reason: MatchReason::ReferenceMatch,
        }
    }

    #[test]
    fn winner_prefers_score_then_distance_then_id() {
        let winner = select_winner(vec![
            candidate(3, 85, Some(10)),
            candidate(1, 100, Some(500_000)),
            candidate(2, 100, Some(1_000)),
        ])
        .unwrap();
        assert_eq!(winner.aggregate_id, 2);

        let winner = select_winner(vec![
            candidate(9, 60, None),
            candidate(4, 60, Some(7_200_000)),
        ])
        .unwrap();
        assert_eq!(winner.aggregate_id, 4);

        let winner =
            select_winner(vec![candidate(8, 60, None), candidate(5, 60, None)]).unwrap();
        assert_eq!(winner.aggregate_id, 5);
    }

    #[test]
    fn no_candidates_no_winner() {
        assert!(select_winner(Vec::new()).is_none());
    }
}
