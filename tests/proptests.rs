//! Property tests for the segmentation, sequencing, and idempotence
//! invariants the scenario tests only sample pointwise.

use std::collections::BTreeMap;

use proptest::prelude::*;

use temporal_merge::catalog::TableId;
use temporal_merge::config::{DeleteMode, MergeMode, MergeRequest, SessionOptions};
use temporal_merge::diff::sequence_statements;
use temporal_merge::interval::Bound;
use temporal_merge::segment::build_atomic_segments;
use temporal_merge::testkit::{FixedCatalog, InMemorySink, InMemorySource};
use temporal_merge::types::{MatchedSourceRow, PlanOperation, SourceRow, TargetRow};
use temporal_merge::value::Value;
use temporal_merge::{temporal_merge, BatchSource};

fn day(n: i64) -> Bound<i64> {
    Bound::Finite(n)
}

fn matched(row: SourceRow, is_new_entity: bool) -> MatchedSourceRow {
    MatchedSourceRow {
        source: row,
        is_new_entity,
        grouping_key: "e1".to_string(),
        discovered_identity: None,
        early_feedback: None,
        is_eclipsed: false,
    }
}

fn blank_source_row(row_id: i64, from: i64, until: i64) -> SourceRow {
    SourceRow {
        row_id,
        correlation_id: None,
        valid_from: day(from),
        valid_until: day(until),
        identity_keys: BTreeMap::new(),
        lookup_keys: BTreeMap::new(),
        data_payload: BTreeMap::new(),
        ephemeral_payload: BTreeMap::new(),
        is_identifiable: true,
    }
}

fn blank_target_row(from: i64, until: i64) -> TargetRow {
    TargetRow {
        valid_from: day(from),
        valid_until: day(until),
        identity_keys: BTreeMap::new(),
        lookup_keys: BTreeMap::new(),
        data_payload: BTreeMap::new(),
        ephemeral_payload: BTreeMap::new(),
        pk_payload: BTreeMap::new(),
    }
}

fn dummy_op(plan_op_seq: i64) -> PlanOperation {
    PlanOperation {
        plan_op_seq,
        statement_seq: 0,
        row_ids: vec![plan_op_seq],
        operation: temporal_merge::types::PlanAction::Insert,
        update_effect: None,
        correlation_id: None,
        is_new_entity: false,
        identity_keys: None,
        lookup_keys: None,
        pk_payload: None,
        s_t_relation: None,
        old_interval: None,
        new_interval: None,
        data: None,
        feedback_message: None,
        trace: None,
        grouping_key: "e1".to_string(),
    }
}

proptest! {
    // Atomic segmentation tiles [min boundary, max boundary] with no gap and
    // no overlap, regardless of how the source/target boundaries interleave.
    #[test]
    fn atomic_segments_tile_without_gaps_or_overlaps(
        points in prop::collection::btree_set(0i64..50, 2..10),
        split_at in 0usize..8,
    ) {
        let sorted: Vec<i64> = points.into_iter().collect();
        let split = split_at % (sorted.len() - 1);

        let source_rows: Vec<SourceRow> = sorted[..=split]
            .windows(2)
            .map(|w| blank_source_row(w[0], w[0], w[1]))
            .collect();
        let matched_rows: Vec<MatchedSourceRow> = source_rows.into_iter().map(|r| matched(r, false)).collect();
        let matched_refs: Vec<&MatchedSourceRow> = matched_rows.iter().collect();

        let target_rows: Vec<TargetRow> = sorted[split..]
            .windows(2)
            .map(|w| blank_target_row(w[0], w[1]))
            .collect();
        let target_refs: Vec<&TargetRow> = target_rows.iter().collect();

        let segments = build_atomic_segments("e1", false, &BTreeMap::new(), None, &matched_refs, &target_refs).unwrap();

        prop_assert!(!segments.is_empty());
        prop_assert_eq!(segments[0].interval.valid_from.clone(), day(sorted[0]));
        prop_assert_eq!(segments.last().unwrap().interval.valid_until.clone(), day(*sorted.last().unwrap()));
        for w in segments.windows(2) {
            prop_assert_eq!(w[0].interval.valid_until.clone(), w[1].interval.valid_from.clone());
        }
    }

    // sequence_statements assigns plan_op_seq as a gapless permutation of
    // 0..n, and the resulting order never decreases statement_seq.
    #[test]
    fn sequence_statements_is_total_and_batch_ordered(n in 1usize..20) {
        let ops: Vec<PlanOperation> = (0..n as i64).map(dummy_op).collect();
        let sequenced = sequence_statements(ops);

        let mut seqs: Vec<i64> = sequenced.iter().map(|op| op.plan_op_seq).collect();
        seqs.sort_unstable();
        prop_assert_eq!(seqs, (0..n as i64).collect::<Vec<_>>());

        let mut last_statement_seq = i32::MIN;
        for op in &sequenced {
            prop_assert!(op.statement_seq >= last_statement_seq);
            last_statement_seq = op.statement_seq;
        }
    }

    // Feeding a target row's own current data back through MERGE_ENTITY_PATCH
    // is a no-op: every row reports SKIP_IDENTICAL and nothing is applied.
    #[test]
    fn merge_entity_patch_is_idempotent(from in 0i64..100, len in 1i64..200, name in "[a-z]{1,8}") {
        let until = from + len;
        let mut identity = BTreeMap::new();
        identity.insert("id".to_string(), Value::Int(1));
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), Value::Text(name));

        let target = vec![TargetRow {
            valid_from: day(from),
            valid_until: day(until),
            identity_keys: identity.clone(),
            lookup_keys: BTreeMap::new(),
            data_payload: data.clone(),
            ephemeral_payload: BTreeMap::new(),
            pk_payload: BTreeMap::new(),
        }];
        let source = vec![SourceRow {
            row_id: 1,
            correlation_id: None,
            valid_from: day(from),
            valid_until: day(until),
            identity_keys: identity,
            lookup_keys: BTreeMap::new(),
            data_payload: data,
            ephemeral_payload: BTreeMap::new(),
            is_identifiable: true,
        }];

        let req = MergeRequest {
            mode: MergeMode::MergeEntityPatch,
            delete_mode: DeleteMode::None,
            era_name: "valid".to_string(),
            identity_columns: vec!["id".to_string()],
            lookup_key_sets: vec![],
            ephemeral_columns: vec![],
            row_id_column: "row_id".to_string(),
            correlation_column: Some("corr".to_string()),
            founding_id_column: None,
            options: SessionOptions::default(),
        };
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
        let mut sink = InMemorySink::new(initial_target.clone());
        let report = temporal_merge(&req, &table, &catalog, &src, &mut sink).unwrap();

        prop_assert_eq!(report.feedback.len(), 1);
        prop_assert_eq!(report.feedback[0].status.as_str(), "SKIP_IDENTICAL");
        prop_assert!(sink.applied_order.is_empty());
        prop_assert_eq!(sink.target.len(), 1);
        prop_assert_eq!(sink.target[0].valid_from.clone(), day(from));
        prop_assert_eq!(sink.target[0].valid_until.clone(), day(until));
    }
}
