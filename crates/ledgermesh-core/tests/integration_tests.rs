//! Integration tests for ledgermesh-core
//!
//! These exercise the full parse → store → reconcile → operate workflow
//! against a throwaway database.

use std::sync::Arc;

use ledgermesh_core::models::{
    ColumnMapping, Direction, NewObservation, OpType, SessionStatus, SmsMessage, SourceType,
};
use ledgermesh_core::{
    default_profiles, fingerprint, project, Database, Error, FixedClock, ImportService,
    OpsService, Reconciler, ReconcilerConfig, SmsParser, SmsSource,
};

const T0: i64 = 1_735_689_600_000;

struct StubSmsSource(Vec<SmsMessage>);

impl SmsSource for StubSmsSource {
    fn all(&self) -> ledgermesh_core::Result<Vec<SmsMessage>> {
        Ok(self.0.clone())
    }

    fn since(&self, after_ms: i64) -> ledgermesh_core::Result<Vec<SmsMessage>> {
        Ok(self
            .0
            .iter()
            .filter(|m| m.date_millis > after_ms)
            .cloned()
            .collect())
    }
}

struct Harness {
    db: Database,
    import: Arc<ImportService>,
    reconciler: Arc<Reconciler>,
    ops: OpsService,
}

fn harness_with_sms(messages: Vec<SmsMessage>) -> Harness {
    let db = Database::in_memory().expect("test database");
    let clock = Arc::new(FixedClock(T0));
    let reconciler = Arc::new(
        Reconciler::new(db.clone(), ReconcilerConfig::default(), clock.clone())
            .expect("default config is valid"),
    );
    let import = Arc::new(ImportService::new(
        db.clone(),
        Arc::new(SmsParser::new(default_profiles())),
        Arc::new(StubSmsSource(messages)),
        reconciler.clone(),
        clock.clone(),
    ));
    let ops = OpsService::new(db.clone(), clock);
    Harness {
        db,
        import,
        reconciler,
        ops,
    }
}

fn harness() -> Harness {
    harness_with_sms(Vec::new())
}

/// An observation fixture with per-test distinguishing fields
#[allow(clippy::too_many_arguments)]
fn obs(
    source: SourceType,
    locator: &str,
    payload: &str,
    amount: i64,
    currency: &str,
    timestamp: Option<i64>,
    direction: Direction,
    reference: Option<&str>,
    parse_confidence: f64,
) -> NewObservation {
    NewObservation {
        source_type: source,
        source_locator: locator.to_string(),
        raw_payload: payload.to_string(),
        amount_minor: amount,
        currency: currency.to_string(),
        timestamp,
        timestamp_date_only: false,
        direction,
        reference: reference.map(|s| s.to_string()),
        counterparty: None,
        account_hint: None,
        parse_confidence,
        content_hash: String::new(),
        fp_ref: None,
        fp_amt_time: None,
        fp_amt_day: None,
        fp_sender_amt: String::new(),
    }
    .seal()
}

// =============================================================================
// Content-hash idempotence (S1)
// =============================================================================

#[test]
fn duplicate_content_stores_one_row_with_known_hash() {
    let h = harness();
    let payload = "RC1 Confirmed. Ksh100.00 paid to X on 1/1/26 at 9:00 AM";
    let sighting = obs(
        SourceType::Sms,
        "MPESA",
        payload,
        10_000,
        "KES",
        Some(T0),
        Direction::Debit,
        Some("RC1"),
        0.85,
    );

    let first = h.db.insert_observation(&sighting, None).unwrap();
    let second = h.db.insert_observation(&sighting, None).unwrap();

    assert!(first.was_inserted());
    assert!(!second.was_inserted());
    assert_eq!(h.db.count_observations().unwrap(), 1);

    let stored = h.db.get_observation(first.id()).unwrap().unwrap();
    // sha256("SMS|MPESA|<payload>"), lowercase hex
    assert_eq!(
        stored.content_hash,
        "e5bf91614e937f59f60e6b615cf0cdafd27356bafa943ed00902389df4ef5e17"
    );
    assert_eq!(
        stored.content_hash,
        fingerprint::content_hash(SourceType::Sms, "MPESA", payload)
    );
}

// =============================================================================
// Reconciliation (S2, S3, S4)
// =============================================================================

#[test]
fn matching_reference_merges_across_sources() {
    let h = harness();
    let a = obs(
        SourceType::Sms,
        "MPESA",
        "sms sighting",
        150_000,
        "KES",
        Some(T0),
        Direction::Debit,
        Some("TXN42"),
        0.85,
    );
    let b = obs(
        SourceType::Csv,
        "export.csv",
        "csv sighting",
        150_000,
        "KES",
        Some(T0 + 60_000),
        Direction::Debit,
        Some("TXN42"),
        0.8,
    );
    h.db.insert_observation_batch(&[a, b], None).unwrap();

    let outcome = h.reconciler.reconcile_all().unwrap();
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.linked, 1);

    assert_eq!(h.db.count_aggregates().unwrap(), 1);
    let agg = h.db.list_aggregates(10, 0).unwrap().remove(0);
    assert_eq!(agg.observation_count, 2);
    assert_eq!(agg.direction, Direction::Debit);
    assert_eq!(agg.reference.as_deref(), Some("TXN42"));
    assert_eq!(agg.amount_minor, 150_000);
    // 30 (two sources) + 20 (reference) + 20 (one minute apart)
    // + 16.5 (avg parse 0.825) + 10 (amounts equal), floored
    assert_eq!(agg.confidence_score, 96);
}

#[test]
fn opposite_directions_never_merge_on_amount_and_day() {
    let h = harness();
    let debit = obs(
        SourceType::Csv,
        "a.csv",
        "debit row",
        9_900,
        "USD",
        Some(T0 + 3_600_000),
        Direction::Debit,
        None,
        0.8,
    );
    let credit = obs(
        SourceType::Csv,
        "b.csv",
        "credit row",
        9_900,
        "USD",
        Some(T0 + 7_200_000),
        Direction::Credit,
        None,
        0.8,
    );
    h.db.insert_observation_batch(&[debit, credit], None).unwrap();

    h.reconciler.reconcile_all().unwrap();

    assert_eq!(h.db.count_aggregates().unwrap(), 2);
    let aggregates = h.db.list_aggregates(10, 0).unwrap();
    assert!(aggregates
        .iter()
        .all(|a| a.direction != Direction::Mixed && a.observation_count == 1));
}

#[test]
fn same_amount_same_day_merges_and_takes_lower_median_timestamp() {
    let h = harness();
    let batch: Vec<NewObservation> = [(T0, "one"), (T0 + 30_000, "two"), (T0 + 90_000, "three")]
        .iter()
        .map(|(t, p)| {
            obs(
                SourceType::Sms,
                "MPESA",
                p,
                5_000,
                "KES",
                Some(*t),
                Direction::Unknown,
                None,
                0.85,
            )
        })
        .collect();
    h.db.insert_observation_batch(&batch, None).unwrap();

    h.reconciler.reconcile_all().unwrap();

    assert_eq!(h.db.count_aggregates().unwrap(), 1);
    let agg = h.db.list_aggregates(10, 0).unwrap().remove(0);
    assert_eq!(agg.observation_count, 3);
    assert_eq!(agg.timestamp, Some(T0 + 30_000));
}

#[test]
fn reconcile_is_idempotent() {
    let h = harness();
    h.db.insert_observation(
        &obs(
            SourceType::Sms,
            "MPESA",
            "solo",
            1_000,
            "KES",
            Some(T0),
            Direction::Debit,
            None,
            0.85,
        ),
        None,
    )
    .unwrap();

    let first = h.reconciler.reconcile_all().unwrap();
    assert_eq!(first.processed, 1);

    let second = h.reconciler.reconcile_all().unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(h.db.count_aggregates().unwrap(), 1);
}

#[test]
fn cancelled_pass_leaves_unprocessed_observations_unlinked() {
    use std::sync::atomic::AtomicBool;

    let h = harness();
    h.db.insert_observation(
        &obs(
            SourceType::Sms,
            "MPESA",
            "never reached",
            1_000,
            "KES",
            Some(T0),
            Direction::Debit,
            None,
            0.85,
        ),
        None,
    )
    .unwrap();

    let cancel = AtomicBool::new(true);
    let outcome = h.reconciler.reconcile_all_cancellable(&cancel).unwrap();
    assert_eq!(outcome.processed, 0);
    assert_eq!(h.db.get_unlinked_observations().unwrap().len(), 1);

    // a later, uncancelled pass picks the observation up
    let outcome = h.reconciler.reconcile_all().unwrap();
    assert_eq!(outcome.processed, 1);
    assert!(h.db.get_unlinked_observations().unwrap().is_empty());
}

#[test]
fn reconcile_topology_is_insertion_order_independent() {
    let population = |h: &Harness, reversed: bool| {
        let mut batch = vec![
            obs(
                SourceType::Sms,
                "MPESA",
                "pair sms",
                150_000,
                "KES",
                Some(T0),
                Direction::Debit,
                Some("TXN42"),
                0.85,
            ),
            obs(
                SourceType::Csv,
                "export.csv",
                "pair csv",
                150_000,
                "KES",
                Some(T0 + 60_000),
                Direction::Debit,
                Some("TXN42"),
                0.8,
            ),
            obs(
                SourceType::Csv,
                "export.csv",
                "loner",
                42_000,
                "KES",
                Some(T0),
                Direction::Credit,
                None,
                0.8,
            ),
        ];
        if reversed {
            batch.reverse();
        }
        h.db.insert_observation_batch(&batch, None).unwrap();
    };

    let topology = |h: &Harness| -> Vec<Vec<String>> {
        let mut groups: Vec<Vec<String>> = h
            .db
            .list_aggregates(100, 0)
            .unwrap()
            .iter()
            .map(|agg| {
                let mut hashes: Vec<String> = h
                    .db
                    .get_observations_for_aggregate(agg.id)
                    .unwrap()
                    .iter()
                    .map(|o| o.content_hash.clone())
                    .collect();
                hashes.sort();
                hashes
            })
            .collect();
        groups.sort();
        groups
    };

    let forward = harness();
    population(&forward, false);
    forward.reconciler.reconcile_all().unwrap();

    let backward = harness();
    population(&backward, true);
    backward.reconciler.reconcile_all().unwrap();

    assert_eq!(topology(&forward), topology(&backward));
}

#[test]
fn reprojection_over_current_links_is_stable() {
    let h = harness();
    h.db.insert_observation_batch(
        &[
            obs(
                SourceType::Sms,
                "MPESA",
                "a",
                150_000,
                "KES",
                Some(T0),
                Direction::Debit,
                Some("TXN42"),
                0.85,
            ),
            obs(
                SourceType::Csv,
                "export.csv",
                "b",
                150_000,
                "KES",
                Some(T0 + 60_000),
                Direction::Debit,
                Some("TXN42"),
                0.8,
            ),
        ],
        None,
    )
    .unwrap();
    h.reconciler.reconcile_all().unwrap();

    let agg = h.db.list_aggregates(10, 0).unwrap().remove(0);
    let linked = h.db.get_observations_for_aggregate(agg.id).unwrap();
    let proj = project(&linked).unwrap();

    assert_eq!(proj.amount_minor, agg.amount_minor);
    assert_eq!(proj.currency, agg.currency);
    assert_eq!(proj.timestamp, agg.timestamp);
    assert_eq!(proj.is_approx_time, agg.is_approx_time);
    assert_eq!(proj.direction, agg.direction);
    assert_eq!(proj.reference, agg.reference);
    assert_eq!(proj.counterparty, agg.counterparty);
    assert_eq!(proj.account_hint, agg.account_hint);
    assert_eq!(proj.confidence_score, agg.confidence_score);
}

#[test]
fn merge_preserves_user_fields_through_reconcile() {
    let h = harness();
    h.db.insert_observation(
        &obs(
            SourceType::Sms,
            "MPESA",
            "first sighting",
            150_000,
            "KES",
            Some(T0),
            Direction::Debit,
            Some("TXN42"),
            0.85,
        ),
        None,
    )
    .unwrap();
    h.reconciler.reconcile_all().unwrap();

    let agg = h.db.list_aggregates(10, 0).unwrap().remove(0);
    let category = h.db.upsert_category("Rent").unwrap();
    h.ops
        .edit_field(agg.id, "categoryId", None, Some(&category.to_string()))
        .unwrap();
    h.ops
        .edit_field(agg.id, "userNotes", None, Some("january rent"))
        .unwrap();

    // A second sighting of the same transaction arrives later
    h.db.insert_observation(
        &obs(
            SourceType::Csv,
            "export.csv",
            "second sighting",
            150_000,
            "KES",
            Some(T0 + 120_000),
            Direction::Debit,
            Some("TXN42"),
            0.8,
        ),
        None,
    )
    .unwrap();
    h.reconciler.reconcile_all().unwrap();

    let agg = h.db.get_aggregate(agg.id).unwrap().unwrap();
    assert_eq!(agg.observation_count, 2);
    assert_eq!(agg.category_id, Some(category));
    assert_eq!(agg.user_notes.as_deref(), Some("january rent"));
}

// =============================================================================
// Manual operations (S5, S6)
// =============================================================================

fn two_distinct_aggregates(h: &Harness) -> (i64, i64) {
    h.db.insert_observation_batch(
        &[
            obs(
                SourceType::Sms,
                "MPESA",
                "first",
                10_000,
                "KES",
                Some(T0),
                Direction::Debit,
                None,
                0.85,
            ),
            obs(
                SourceType::Sms,
                "MPESA",
                "second",
                20_000,
                "KES",
                Some(T0 + 86_400_000 * 2),
                Direction::Debit,
                None,
                0.85,
            ),
        ],
        None,
    )
    .unwrap();
    h.reconciler.reconcile_all().unwrap();
    let mut aggregates = h.db.list_aggregates(10, 0).unwrap();
    aggregates.sort_by_key(|a| a.id);
    (aggregates[0].id, aggregates[1].id)
}

#[test]
fn force_merge_moves_links_and_keeps_user_notes() {
    let h = harness();
    let (target, source) = two_distinct_aggregates(&h);

    h.ops
        .edit_field(target, "userNotes", None, Some("mine"))
        .unwrap();
    let source_obs = h.db.linked_observation_ids(source).unwrap();

    let moved = h.ops.force_merge(target, source).unwrap();
    assert_eq!(moved, source_obs);

    // target absorbed everything, source is gone
    let target_row = h.db.get_aggregate(target).unwrap().unwrap();
    assert_eq!(target_row.observation_count, 2);
    assert_eq!(target_row.user_notes.as_deref(), Some("mine"));
    assert!(h.db.get_aggregate(source).unwrap().is_none());

    let target_links = h.db.linked_observation_ids(target).unwrap();
    for id in &source_obs {
        assert!(target_links.contains(id));
    }

    let merges: Vec<_> = h
        .db
        .get_ops_log_for_aggregate(target)
        .unwrap()
        .into_iter()
        .filter(|e| e.op_type == OpType::Merge)
        .collect();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].secondary_aggregate_id, Some(source));
    assert_eq!(merges[0].affected_ids(), source_obs);
}

#[test]
fn merging_debit_and_credit_projects_mixed() {
    let h = harness();
    h.db.insert_observation_batch(
        &[
            obs(
                SourceType::Csv,
                "a.csv",
                "debit row",
                9_900,
                "USD",
                Some(T0),
                Direction::Debit,
                None,
                0.8,
            ),
            obs(
                SourceType::Csv,
                "b.csv",
                "credit row",
                9_900,
                "USD",
                Some(T0 + 3_600_000),
                Direction::Credit,
                None,
                0.8,
            ),
        ],
        None,
    )
    .unwrap();
    h.reconciler.reconcile_all().unwrap();

    let mut aggregates = h.db.list_aggregates(10, 0).unwrap();
    aggregates.sort_by_key(|a| a.id);
    assert_eq!(aggregates.len(), 2);

    h.ops.force_merge(aggregates[0].id, aggregates[1].id).unwrap();
    let merged = h.db.get_aggregate(aggregates[0].id).unwrap().unwrap();
    assert_eq!(merged.direction, Direction::Mixed);
}

#[test]
fn split_carves_out_a_new_aggregate() {
    let h = harness();
    let batch: Vec<NewObservation> = [(T0, "one"), (T0 + 30_000, "two"), (T0 + 90_000, "three")]
        .iter()
        .map(|(t, p)| {
            obs(
                SourceType::Sms,
                "MPESA",
                p,
                5_000,
                "KES",
                Some(*t),
                Direction::Unknown,
                None,
                0.85,
            )
        })
        .collect();
    h.db.insert_observation_batch(&batch, None).unwrap();
    h.reconciler.reconcile_all().unwrap();

    let agg = h.db.list_aggregates(10, 0).unwrap().remove(0);
    let before = h.db.linked_observation_ids(agg.id).unwrap();
    assert_eq!(before.len(), 3);

    let carved = before[0];
    let new_id = h.ops.split(agg.id, &[carved]).unwrap();

    let remaining = h.db.linked_observation_ids(agg.id).unwrap();
    let moved = h.db.linked_observation_ids(new_id).unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(moved, vec![carved]);
    // disjoint, and together they are exactly the pre-split set
    assert!(remaining.iter().all(|id| !moved.contains(id)));
    let mut union: Vec<i64> = remaining.iter().chain(moved.iter()).copied().collect();
    union.sort_unstable();
    assert_eq!(union, before);

    let splits: Vec<_> = h
        .db
        .get_ops_log_for_aggregate(agg.id)
        .unwrap()
        .into_iter()
        .filter(|e| e.op_type == OpType::Split)
        .collect();
    assert_eq!(splits.len(), 1);
    assert_eq!(splits[0].secondary_aggregate_id, Some(new_id));

    // carving out everything that's left is rejected
    let err = h.ops.split(agg.id, &remaining).unwrap_err();
    assert!(matches!(err, Error::InvalidSplit(_)));
}

#[test]
fn split_rejects_bad_selections() {
    let h = harness();
    let (target, _) = two_distinct_aggregates(&h);

    assert!(matches!(
        h.ops.split(target, &[]).unwrap_err(),
        Error::InvalidSplit(_)
    ));
    assert!(matches!(
        h.ops.split(target, &[9_999]).unwrap_err(),
        Error::InvalidSplit(_)
    ));
}

#[test]
fn mark_duplicate_logs_without_touching_links() {
    let h = harness();
    let (target, _) = two_distinct_aggregates(&h);
    let linked = h.db.linked_observation_ids(target).unwrap();

    h.ops.mark_duplicate(target, linked[0]).unwrap();

    assert_eq!(h.db.linked_observation_ids(target).unwrap(), linked);
    let entries = h.db.get_ops_log_for_aggregate(target).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].op_type, OpType::MarkDuplicate);
    assert_eq!(entries[0].affected_ids(), vec![linked[0]]);
}

#[test]
fn edit_field_recognizes_known_fields_only() {
    let h = harness();
    let (target, _) = two_distinct_aggregates(&h);

    h.ops
        .edit_field(target, "canonicalCounterparty", None, Some("ACME LTD"))
        .unwrap();
    h.ops
        .edit_field(target, "canonicalDirection", Some("DEBIT"), Some("credit"))
        .unwrap();
    // unparsable direction coerces to UNKNOWN
    h.ops
        .edit_field(target, "canonicalDirection", None, Some("sideways"))
        .unwrap();
    // unknown field: silent no-op, no audit entry
    h.ops
        .edit_field(target, "somethingElse", None, Some("x"))
        .unwrap();

    let agg = h.db.get_aggregate(target).unwrap().unwrap();
    assert_eq!(agg.counterparty.as_deref(), Some("ACME LTD"));
    assert_eq!(agg.direction, Direction::Unknown);

    let edits = h.db.get_ops_log_for_aggregate(target).unwrap();
    assert_eq!(edits.len(), 3);
    assert!(edits.iter().all(|e| e.op_type == OpType::EditField));
}

// =============================================================================
// Import orchestration
// =============================================================================

#[test]
fn csv_import_runs_the_full_pipeline() {
    let h = harness();
    let mapping = ColumnMapping {
        date_column: 0,
        amount_column: Some(1),
        debit_column: None,
        credit_column: None,
        description_column: Some(2),
        reference_column: Some(3),
        date_format: None,
        currency: "KES".to_string(),
    };
    let data = "Date,Amount,Description,Reference\n\
                2026-01-05,-1500.00,RENT,TXN42\n\
                2026-01-06,250.00,REFUND,TXN77\n\
                garbage,1.00,BAD,\n";

    let outcome = h.import.import_csv(data.as_bytes(), "export.csv", &mapping).unwrap();
    assert_eq!(outcome.imported, 2);
    assert_eq!(outcome.skipped, 0);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.errors.len(), 1);

    let session = h.db.get_import_session(outcome.session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.imported, 2);
    assert_eq!(session.failed, 1);

    // observations were reconciled into aggregates straight away
    assert_eq!(h.db.get_unlinked_observations().unwrap().len(), 0);
    assert_eq!(h.db.count_aggregates().unwrap(), 2);

    // importing the identical file again only skips
    let again = h.import.import_csv(data.as_bytes(), "export.csv", &mapping).unwrap();
    assert_eq!(again.imported, 0);
    assert_eq!(again.skipped, 2);
    assert_eq!(h.db.count_observations().unwrap(), 2);
}

#[test]
fn sms_import_counts_unmatched_messages() {
    let messages = vec![
        SmsMessage {
            id: 1,
            sender: "MPESA".to_string(),
            body: "RC1 Confirmed. Ksh100.00 paid to X on 1/1/26 at 9:00 AM".to_string(),
            date_millis: T0,
        },
        SmsMessage {
            id: 2,
            sender: "MPESA".to_string(),
            body: "RC2 Confirmed. You have received Ksh250.00 from Y on 1/1/26".to_string(),
            date_millis: T0 + 60_000,
        },
        SmsMessage {
            id: 3,
            sender: "FRIEND".to_string(),
            body: "see you at six".to_string(),
            date_millis: T0 + 120_000,
        },
    ];
    let h = harness_with_sms(messages);

    let outcome = h.import.import_sms_all().unwrap();
    assert_eq!(outcome.imported, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.total, 3);

    let session = h.db.get_import_session(outcome.session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.source_type, SourceType::Sms);
}

#[test]
fn sms_import_since_filters_by_watermark() {
    let messages = vec![
        SmsMessage {
            id: 1,
            sender: "MPESA".to_string(),
            body: "RC1 Confirmed. Ksh100.00 paid to X on 1/1/26 at 9:00 AM".to_string(),
            date_millis: T0,
        },
        SmsMessage {
            id: 2,
            sender: "MPESA".to_string(),
            body: "RC3 Confirmed. Ksh75.00 paid to Z on 2/1/26 at 9:00 AM".to_string(),
            date_millis: T0 + 86_400_000,
        },
    ];
    let h = harness_with_sms(messages);

    let outcome = h.import.import_sms_since(T0).unwrap();
    assert_eq!(outcome.imported, 1);
    assert_eq!(h.db.count_observations().unwrap(), 1);
}

#[test]
fn unreadable_pdf_fails_the_session() {
    let h = harness();
    let err = h
        .import
        .import_pdf(b"this is not a pdf", "fake.pdf", "USD")
        .unwrap_err();
    assert!(matches!(err, Error::Import(_) | Error::ScannedPdf(_)));

    let sessions = h.db.list_import_sessions(1).unwrap();
    assert_eq!(sessions[0].status, SessionStatus::Failed);
    assert!(sessions[0].error_message.is_some());
}

#[test]
fn review_queue_surfaces_low_confidence_aggregates() {
    let h = harness();
    // a lone SMS sighting scores well under the default threshold of 75:
    // 15 (one source) + 10 (one timestamp) + 17 (parse 0.85) + 10 (amounts) = 52
    h.db.insert_observation(
        &obs(
            SourceType::Sms,
            "MPESA",
            "weak evidence",
            3_000,
            "KES",
            Some(T0),
            Direction::Debit,
            None,
            0.85,
        ),
        None,
    )
    .unwrap();
    h.reconciler.reconcile_all().unwrap();

    let queue = h.reconciler.review_queue().unwrap();
    assert_eq!(queue.len(), 1);
    assert!(queue[0].confidence_score < 75);
}
