//! End-to-end merge scenarios against a `daterange`-shaped era with identity
//! `{id}` and a single data column `name`.
//! Dates are represented as day offsets (`i64`) rather than calendar dates —
//! the engine only needs `Ord`, and small integers make the fixtures
//! readable (2023-01-01 = day 0, 2023-03-01 = day 59, etc. are not exact;
//! only relative order matters for these tests).

use std::collections::BTreeMap;

use temporal_merge::catalog::TableId;
use temporal_merge::config::{DeleteMode, MergeMode, MergeRequest, SessionOptions};
use temporal_merge::executor::DmlSink;
use temporal_merge::interval::Bound;
use temporal_merge::testkit::{FixedCatalog, InMemorySink, InMemorySource};
use temporal_merge::types::{FeedbackRow, PlanAction, SourceRow, TargetRow};
use temporal_merge::value::Value;
use temporal_merge::{temporal_merge, BatchSource};

fn day(n: i64) -> Bound<i64> {
    Bound::Finite(n)
}

fn id_payload(id: i64) -> BTreeMap<String, Value> {
    let mut m = BTreeMap::new();
    m.insert("id".to_string(), Value::Int(id));
    m
}

fn name_payload(name: &str) -> BTreeMap<String, Value> {
    let mut m = BTreeMap::new();
    m.insert("name".to_string(), Value::Text(name.to_string()));
    m
}

fn request(mode: MergeMode, delete_mode: DeleteMode) -> MergeRequest {
    let founding_id_column = mode.allows_founding().then(|| "id".to_string());
    MergeRequest {
        mode,
        delete_mode,
        era_name: "valid".to_string(),
        identity_columns: vec!["id".to_string()],
        lookup_key_sets: vec![],
        ephemeral_columns: vec![],
        row_id_column: "row_id".to_string(),
        correlation_column: Some("corr".to_string()),
        founding_id_column,
        options: SessionOptions::default(),
    }
}

fn run_full(
    req: &MergeRequest,
    target: Vec<TargetRow>,
    source: Vec<SourceRow>,
) -> (InMemorySink, Vec<FeedbackRow>) {
    let catalog = FixedCatalog::simple("id");
    let table = TableId::new("target");
    let src = InMemorySource {
        rows: source,
        target: std::sync::Mutex::new(target),
        columns: vec![
            "row_id".into(),
            "corr".into(),
            "id".into(),
            "valid_from".into(),
            "valid_until".into(),
            "name".into(),
        ],
    };
    let initial_target = src.target_rows_for(&[]).unwrap();
    let mut sink = InMemorySink::new(initial_target);
    let report = temporal_merge(req, &table, &catalog, &src, &mut sink).unwrap();
    (sink, report.feedback)
}

fn run(
    req: &MergeRequest,
    target: Vec<TargetRow>,
    source: Vec<SourceRow>,
) -> (InMemorySink, Vec<String>) {
    let (sink, feedback) = run_full(req, target, source);
    let statuses: Vec<String> = feedback
        .iter()
        .map(|f| format!("{}:{}", f.row_id, f.status.as_str()))
        .collect();
    (sink, statuses)
}

#[test]
fn patch_over_gap_leaves_untouched_remainder_as_structural_shrink() {
    let req = request(MergeMode::MergeEntityPatch, DeleteMode::None);
    let target = vec![TargetRow {
        valid_from: day(0),
        valid_until: day(150),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("A"),
        ephemeral_payload: BTreeMap::new(),
        pk_payload: BTreeMap::new(),
    }];
    let source = vec![SourceRow {
        row_id: 1,
        correlation_id: None,
        valid_from: day(59),
        valid_until: day(243),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("B"),
        ephemeral_payload: BTreeMap::new(),
        is_identifiable: true,
    }];

    let (sink, statuses) = run(&req, target, source);

    // Row 1 patches in new data starting 2023-03-01; the untouched remainder
    // of the original row ([2023-01-01, 2023-03-01)) survives as a structural
    // shrink with no source row of its own, so it contributes no feedback.
    assert_eq!(statuses, vec!["1:INSERT".to_string()]);
    let mut rows = sink.target.clone();
    rows.sort_by_key(|r| r.valid_from.clone());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].valid_until, day(59));
    assert_eq!(rows[0].data_payload.get("name"), Some(&Value::Text("A".into())));
    assert_eq!(rows[1].valid_from, day(59));
    assert_eq!(rows[1].data_payload.get("name"), Some(&Value::Text("B".into())));
}

#[test]
fn surgical_patch_splits_row_into_three() {
    let req = request(MergeMode::PatchForPortionOf, DeleteMode::None);
    let target = vec![TargetRow {
        valid_from: day(0),
        valid_until: day(365),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("A"),
        ephemeral_payload: BTreeMap::new(),
        pk_payload: BTreeMap::new(),
    }];
    let source = vec![SourceRow {
        row_id: 1,
        correlation_id: None,
        valid_from: day(100),
        valid_until: day(200),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("B"),
        ephemeral_payload: BTreeMap::new(),
        is_identifiable: true,
    }];

    let (sink, statuses) = run(&req, target, source);

    // The patch lands entirely inside the original row's bounds, splitting it
    // into three physical rows: the unchanged head (updated in place, no
    // feedback of its own), the patched middle (a fresh INSERT carrying row
    // 1's feedback), and the unchanged tail (also a fresh INSERT, since one
    // original row can only ever be reused as one UPDATE).
    assert_eq!(statuses, vec!["1:INSERT".to_string()]);
    let mut rows = sink.target.clone();
    rows.sort_by_key(|r| r.valid_from.clone());
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].valid_from, day(0));
    assert_eq!(rows[0].valid_until, day(100));
    assert_eq!(rows[0].data_payload.get("name"), Some(&Value::Text("A".into())));
    assert_eq!(rows[1].valid_from, day(100));
    assert_eq!(rows[1].valid_until, day(200));
    assert_eq!(rows[1].data_payload.get("name"), Some(&Value::Text("B".into())));
    assert_eq!(rows[2].valid_from, day(200));
    assert_eq!(rows[2].valid_until, day(365));
    assert_eq!(rows[2].data_payload.get("name"), Some(&Value::Text("A".into())));
}

#[test]
fn founding_new_entity_shares_one_generated_id() {
    let req = request(MergeMode::MergeEntityUpsert, DeleteMode::None);
    let source = vec![
        SourceRow {
            row_id: 1,
            correlation_id: Some("1".to_string()),
            valid_from: day(0),
            valid_until: day(365),
            identity_keys: BTreeMap::new(),
            lookup_keys: BTreeMap::new(),
            data_payload: name_payload("X"),
            ephemeral_payload: BTreeMap::new(),
            is_identifiable: true,
        },
        SourceRow {
            row_id: 2,
            correlation_id: Some("1".to_string()),
            valid_from: day(365),
            valid_until: day(730),
            identity_keys: BTreeMap::new(),
            lookup_keys: BTreeMap::new(),
            data_payload: name_payload("Y"),
            ephemeral_payload: BTreeMap::new(),
            is_identifiable: true,
        },
    ];

    let (sink, feedback) = run_full(&req, vec![], source);

    assert_eq!(feedback.len(), 2);
    assert!(feedback.iter().all(|f| f.status == PlanAction::Insert));
    assert_eq!(sink.target.len(), 2);
    let ids: Vec<&Value> = sink.target.iter().map(|r| r.identity_keys.get("id").unwrap()).collect();
    assert_eq!(ids[0], ids[1]);

    // Both rows founded the same entity, so feedback reports the same
    // resolved target_entity_keys for each, carrying the shared generated id.
    let keys: Vec<&Value> = feedback
        .iter()
        .map(|f| f.target_entity_keys.as_ref().unwrap().get("id").unwrap())
        .collect();
    assert_eq!(keys[0], keys[1]);
    assert_eq!(keys[0], ids[0]);
}

#[test]
fn destructive_timeline_delete_shrinks_to_source_coverage() {
    let req = request(MergeMode::ReplaceForPortionOf, DeleteMode::DeleteMissingTimeline);
    let target = vec![TargetRow {
        valid_from: day(0),
        valid_until: day(365),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("A"),
        ephemeral_payload: BTreeMap::new(),
        pk_payload: BTreeMap::new(),
    }];
    let source = vec![SourceRow {
        row_id: 1,
        correlation_id: None,
        valid_from: day(150),
        valid_until: day(250),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("A"),
        ephemeral_payload: BTreeMap::new(),
        is_identifiable: true,
    }];

    let (sink, _statuses) = run(&req, target, source);

    assert_eq!(sink.target.len(), 1);
    assert_eq!(sink.target[0].valid_from, day(150));
    assert_eq!(sink.target[0].valid_until, day(250));
}

#[test]
fn delete_for_portion_of_clears_source_covered_prefix() {
    let req = request(MergeMode::DeleteForPortionOf, DeleteMode::None);
    let target = vec![TargetRow {
        valid_from: day(0),
        valid_until: day(365),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("A"),
        ephemeral_payload: BTreeMap::new(),
        pk_payload: BTreeMap::new(),
    }];
    let source = vec![SourceRow {
        row_id: 1,
        correlation_id: None,
        valid_from: day(0),
        valid_until: day(200),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("ignored"),
        ephemeral_payload: BTreeMap::new(),
        is_identifiable: true,
    }];

    let (sink, statuses) = run(&req, target, source);

    // Row 1 names a portion to remove, not data to merge in — its own payload
    // is never applied. The covered prefix [0, 200) is deleted outright; the
    // untouched tail [200, 365) survives as a fresh row with its original data.
    assert_eq!(statuses, vec!["1:DELETE".to_string()]);
    assert_eq!(sink.target.len(), 1);
    assert_eq!(sink.target[0].valid_from, day(200));
    assert_eq!(sink.target[0].valid_until, day(365));
    assert_eq!(sink.target[0].data_payload.get("name"), Some(&Value::Text("A".into())));
}

#[test]
fn identical_data_is_a_no_op() {
    let req = request(MergeMode::MergeEntityPatch, DeleteMode::None);
    let target = vec![TargetRow {
        valid_from: day(0),
        valid_until: day(365),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("A"),
        ephemeral_payload: BTreeMap::new(),
        pk_payload: BTreeMap::new(),
    }];
    let source = vec![SourceRow {
        row_id: 1,
        correlation_id: None,
        valid_from: day(0),
        valid_until: day(365),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("A"),
        ephemeral_payload: BTreeMap::new(),
        is_identifiable: true,
    }];

    let (sink, statuses) = run(&req, target.clone(), source);

    assert_eq!(statuses, vec!["1:SKIP_IDENTICAL".to_string()]);
    assert_eq!(sink.applied_order.len(), 0);
    assert_eq!(sink.target.len(), 1);
}

#[test]
fn insert_new_entities_filters_out_existing_ones() {
    let req = request(MergeMode::InsertNewEntities, DeleteMode::None);
    let target = vec![TargetRow {
        valid_from: day(0),
        valid_until: day(100_000),
        identity_keys: id_payload(1),
        lookup_keys: BTreeMap::new(),
        data_payload: name_payload("existing"),
        ephemeral_payload: BTreeMap::new(),
        pk_payload: BTreeMap::new(),
    }];
    let source = vec![
        SourceRow {
            row_id: 1,
            correlation_id: None,
            valid_from: day(0),
            valid_until: day(100_000),
            identity_keys: id_payload(1),
            lookup_keys: BTreeMap::new(),
            data_payload: name_payload("ignored"),
            ephemeral_payload: BTreeMap::new(),
            is_identifiable: true,
        },
        SourceRow {
            row_id: 2,
            correlation_id: Some("new".to_string()),
            valid_from: day(0),
            valid_until: day(365),
            identity_keys: BTreeMap::new(),
            lookup_keys: BTreeMap::new(),
            data_payload: name_payload("fresh"),
            ephemeral_payload: BTreeMap::new(),
            is_identifiable: true,
        },
    ];

    let (sink, statuses) = run(&req, target, source);

    assert!(statuses.contains(&"1:SKIP_FILTERED".to_string()));
    assert!(statuses.contains(&"2:INSERT".to_string()));
    assert_eq!(sink.target.len(), 2);
}

#[test]
fn feedback_status_as_str_matches_precedence_ranking() {
    assert!(PlanAction::Error.feedback_precedence() < PlanAction::Insert.feedback_precedence());
    assert!(PlanAction::Insert.feedback_precedence() < PlanAction::SkipNoTarget.feedback_precedence());
    assert!(PlanAction::SkipEclipsed.feedback_precedence() < PlanAction::SkipIdentical.feedback_precedence());
}
