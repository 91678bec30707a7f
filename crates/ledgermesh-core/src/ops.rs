//! Manual operations over aggregates: force-merge, split, mark-duplicate
//! and field edits, each leaving one audit entry
//!
//! Edits are last-write-wins; the recorded old value is informational and
//! never checked against the row.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::db::{format_datetime, Database, EditValue, NewOpsLogEntry};
use crate::error::{Error, Result};
use crate::models::{Aggregate, Direction, OpType};
use crate::projector::project;

/// Field names accepted by [`OpsService::edit_field`]
pub const RECOGNIZED_EDIT_FIELDS: [&str; 4] = [
    "categoryId",
    "userNotes",
    "canonicalCounterparty",
    "canonicalDirection",
];

pub struct OpsService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl OpsService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// The set of field names `edit_field` will act on
    pub fn recognized_edit_fields(&self) -> &'static [&'static str] {
        &RECOGNIZED_EDIT_FIELDS
    }

    /// Move every observation from `source` onto `target`, delete the
    /// emptied source and re-project the target, preserving its user fields.
    ///
    /// Returns the moved observation ids, which the MERGE audit entry also
    /// records.
    pub fn force_merge(&self, target_id: i64, source_id: i64) -> Result<Vec<i64>> {
        if target_id == source_id {
            return Err(Error::InvalidData(
                "cannot merge an aggregate into itself".to_string(),
            ));
        }
        let target = self.require_aggregate(target_id)?;
        let source = self.require_aggregate(source_id)?;

        let mut set = self.db.get_observations_for_aggregate(target.id)?;
        for obs in self.db.get_observations_for_aggregate(source.id)? {
            if !set.iter().any(|o| o.id == obs.id) {
                set.push(obs);
            }
        }
        let proj = project(&set).ok_or_else(|| {
            Error::InvalidData(format!("aggregate {} has no observations", target_id))
        })?;

        let moved =
            self.db
                .apply_force_merge(target_id, source_id, &proj, self.clock.now_utc())?;
        debug!(target_id, source_id, moved = moved.len(), "force merge");
        Ok(moved)
    }

    /// Carve the given observations out of `source` into a new aggregate.
    ///
    /// Fails with `InvalidSplit` when the selection is empty, would leave
    /// the source empty, or names observations not linked to the source.
    /// Returns the new aggregate's id.
    pub fn split(&self, source_id: i64, observation_ids: &[i64]) -> Result<i64> {
        if observation_ids.is_empty() {
            return Err(Error::InvalidSplit("no observations selected".to_string()));
        }
        self.require_aggregate(source_id)?;

        let linked = self.db.linked_observation_ids(source_id)?;
        for id in observation_ids {
            if !linked.contains(id) {
                return Err(Error::InvalidSplit(format!(
                    "observation {} is not linked to aggregate {}",
                    id, source_id
                )));
            }
        }
        let mut split_ids: Vec<i64> = observation_ids.to_vec();
        split_ids.sort_unstable();
        split_ids.dedup();
        if split_ids.len() >= linked.len() {
            return Err(Error::InvalidSplit(
                "split would leave the source aggregate empty".to_string(),
            ));
        }

        let all = self.db.get_observations_for_aggregate(source_id)?;
        let (split_set, remainder): (Vec<_>, Vec<_>) =
            all.into_iter().partition(|o| split_ids.contains(&o.id));

        let split_proj = project(&split_set).ok_or_else(|| {
            Error::InvalidSplit("selected observations not found".to_string())
        })?;
        let remainder_proj = project(&remainder).ok_or_else(|| {
            Error::InvalidSplit("split would leave the source aggregate empty".to_string())
        })?;

        let new_id = self.db.apply_split(
            source_id,
            &split_ids,
            &split_proj,
            &remainder_proj,
            self.clock.now_utc(),
        )?;
        debug!(source = source_id, new = new_id, count = split_ids.len(), "split");
        Ok(new_id)
    }

    /// Record that an observation looks like a duplicate sighting.
    ///
    /// Purely informational: one MARK_DUPLICATE audit entry, no link or
    /// projection change. A later reconcile pass may act on the hint.
    pub fn mark_duplicate(&self, aggregate_id: i64, observation_id: i64) -> Result<()> {
        self.require_aggregate(aggregate_id)?;
        self.db
            .get_observation(observation_id)?
            .ok_or_else(|| Error::NotFound(format!("observation {}", observation_id)))?;

        self.db.append_ops_log(
            &NewOpsLogEntry {
                op_type: OpType::MarkDuplicate,
                target_aggregate_id: aggregate_id,
                secondary_aggregate_id: None,
                affected_observation_ids: vec![observation_id],
                field_name: None,
                old_value: None,
                new_value: None,
            },
            &format_datetime(self.clock.now_utc()),
        )?;
        Ok(())
    }

    /// Set one user-editable field, last write wins.
    ///
    /// Unrecognized field names are a silent no-op with no audit entry. For
    /// `canonicalDirection` an unparsable value coerces to UNKNOWN. The old
    /// value is recorded in the audit entry but never checked.
    pub fn edit_field(
        &self,
        aggregate_id: i64,
        field_name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<()> {
        self.require_aggregate(aggregate_id)?;

        let value = match field_name {
            "categoryId" => EditValue::CategoryId(new_value.and_then(|s| s.trim().parse().ok())),
            "userNotes" => EditValue::UserNotes(new_value.map(|s| s.to_string())),
            "canonicalCounterparty" => {
                EditValue::Counterparty(new_value.map(|s| s.to_string()))
            }
            "canonicalDirection" => EditValue::Direction(
                new_value
                    .and_then(|s| s.parse::<Direction>().ok())
                    .unwrap_or(Direction::Unknown),
            ),
            other => {
                warn!(field = other, "ignoring edit of unrecognized field");
                return Ok(());
            }
        };

        self.db.apply_edit_field(
            aggregate_id,
            &value,
            field_name,
            old_value,
            new_value,
            self.clock.now_utc(),
        )
    }

    fn require_aggregate(&self, id: i64) -> Result<Aggregate> {
        self.db
            .get_aggregate(id)?
            .ok_or_else(|| Error::NotFound(format!("aggregate {}", id)))
    }
}
