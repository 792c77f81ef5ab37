//! Feedback aggregation.
//!
//! A source row can be touched by more than one plan operation (e.g. a row
//! contributing to both an UPDATE and, via coalescing, a neighboring
//! SKIP_IDENTICAL); the row's final status is the highest-precedence one:
//! ERROR > APPLIED > SKIPPED_NO_TARGET > SKIPPED_FILTERED > SKIPPED_ECLIPSED
//! > SKIPPED_IDENTICAL.

use std::collections::BTreeMap;

use crate::types::FeedbackRow;

pub fn aggregate_feedback(rows: Vec<FeedbackRow>) -> Vec<FeedbackRow> {
    let mut best: BTreeMap<i64, FeedbackRow> = BTreeMap::new();
    for row in rows {
        // A negative row id marks an operation with no contributing source
        // row (e.g. the structural shrink of an old row whose own range no
        // source touched directly, only its neighbor). Feedback is reported
        // per source row, so these carry no feedback of their own.
        if row.row_id < 0 {
            continue;
        }
        match best.get(&row.row_id) {
            Some(existing) if existing.status.feedback_precedence() <= row.status.feedback_precedence() => {}
            _ => {
                best.insert(row.row_id, row);
            }
        }
    }
    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlanAction;

    #[test]
    fn error_outranks_applied() {
        let rows = vec![
            FeedbackRow { row_id: 1, target_entity_keys: None, status: PlanAction::Insert, message: None },
            FeedbackRow { row_id: 1, target_entity_keys: None, status: PlanAction::Error, message: Some("boom".into()) },
        ];
        let agg = aggregate_feedback(rows);
        assert_eq!(agg.len(), 1);
        assert_eq!(agg[0].status, PlanAction::Error);
    }

    #[test]
    fn applied_outranks_skip_identical() {
        let rows = vec![
            FeedbackRow { row_id: 2, target_entity_keys: None, status: PlanAction::SkipIdentical, message: None },
            FeedbackRow { row_id: 2, target_entity_keys: None, status: PlanAction::Update, message: None },
        ];
        let agg = aggregate_feedback(rows);
        assert_eq!(agg[0].status, PlanAction::Update);
    }
}
