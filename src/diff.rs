//! Diff against the original target timeline and operation assignment.

use crate::catalog::PlannerContext;
use crate::config::{DeleteMode, MergeMode};
use crate::interval::AllenRelation;
use crate::types::{CoalescedSegment, DiffRow, MatchedSourceRow, PlanAction, PlanOperation, TargetRow, UpdateEffect};
use crate::value::payloads_equal_ignoring_nulls;

/// Full outer join between the coalesced timeline and the entity's original
/// target rows, keyed by `ancestor_valid_from` for matched segments and by
/// an unmatched-target pass for rows the coalesced timeline no longer covers.
///
/// A single original target row can split into several final segments when
/// the source only patches part of its range. Exactly one of those segments
/// reuses the row as an `UPDATE` — the one whose `valid_from` continues the
/// row's own, preferring continuity over split order — and any further
/// segment overlapping the same original row becomes an `INSERT` instead,
/// since one physical row cannot become two.
pub fn compute_diff(
    coalesced: &[CoalescedSegment],
    targets: &[&TargetRow],
    sources: &[&MatchedSourceRow],
) -> Vec<DiffRow> {
    let mut rows = Vec::new();
    let mut matched_targets = vec![false; targets.len()];
    let mut consumed_targets = vec![false; targets.len()];

    for seg in coalesced {
        let target_idx = targets
            .iter()
            .position(|t| t.interval().intersects(&seg.interval));
        if let Some(idx) = target_idx {
            matched_targets[idx] = true;
        }
        // The stable PK payload is propagated from whichever target row this
        // segment overlaps, regardless of which segment wins the UPDATE reuse
        // below — every slice split from an existing row carries its identifiers.
        let overlapping = target_idx.map(|idx| targets[idx]);
        let continues_row = target_idx
            .map(|idx| targets[idx].valid_from == seg.interval.valid_from)
            .unwrap_or(false);
        let reuse_target = match target_idx {
            Some(idx) if continues_row && !consumed_targets[idx] => {
                consumed_targets[idx] = true;
                Some(idx)
            }
            Some(idx) if !consumed_targets[idx] => {
                consumed_targets[idx] = true;
                Some(idx)
            }
            _ => None,
        };
        let target = reuse_target.map(|i| targets[i]);
        rows.push(DiffRow {
            grouping_key: seg.grouping_key.clone(),
            is_new_entity: seg.is_new_entity,
            identity_keys: seg.identity_keys.clone(),
            correlation_id: seg.correlation_id.clone(),
            row_ids: seg.row_ids.clone(),
            final_interval: Some(seg.interval.clone()),
            final_payload: seg.data_payload.clone(),
            target_interval: target.map(|t| t.interval()),
            target_payload: target.map(|t| t.data_payload.clone()),
            overlaps_target: target_idx.is_some(),
            ephemeral_payload: seg.ephemeral_payload.clone(),
            has_source_coverage: seg.has_source_coverage,
            s_t_relation: seg.s_t_relation,
            target_ephemeral: target.map(|t| t.ephemeral_payload.clone()),
            target_lookup_keys: target.map(|t| t.lookup_keys.clone()),
            target_pk_payload: overlapping.map(|t| t.pk_payload.clone()),
        });
    }

    for (idx, covered) in matched_targets.iter().enumerate() {
        if !covered {
            let t = targets[idx];
            rows.push(DiffRow {
                grouping_key: String::new(),
                is_new_entity: false,
                identity_keys: t.identity_keys.clone(),
                correlation_id: None,
                row_ids: causal_row_ids(sources, t),
                final_interval: None,
                final_payload: None,
                target_interval: Some(t.interval()),
                target_payload: Some(t.data_payload.clone()),
                overlaps_target: true,
                ephemeral_payload: None,
                has_source_coverage: false,
                s_t_relation: None,
                target_ephemeral: Some(t.ephemeral_payload.clone()),
                target_lookup_keys: Some(t.lookup_keys.clone()),
                target_pk_payload: Some(t.pk_payload.clone()),
            });
        }
    }

    rows
}

/// Causal attribution for a target row consumed entirely by destructive
/// logic (no surviving island references it): (1) a source row whose
/// interval overlaps it, (2) a source row that meets it on its right
/// boundary, (3) one that meets it on its left, (4) highest row id as a
/// last-resort tie-break across the whole entity partition.
fn causal_row_ids(sources: &[&MatchedSourceRow], target: &TargetRow) -> Vec<i64> {
    let t = target.interval();
    let best_of = |rows: &[&&MatchedSourceRow]| -> Option<i64> {
        rows.iter().map(|s| s.source.row_id).max()
    };

    let overlapping: Vec<&&MatchedSourceRow> =
        sources.iter().filter(|s| s.source.interval().intersects(&t)).collect();
    if let Some(row_id) = best_of(&overlapping) {
        return vec![row_id];
    }

    let meets_right: Vec<&&MatchedSourceRow> =
        sources.iter().filter(|s| s.source.valid_from == t.valid_until).collect();
    if let Some(row_id) = best_of(&meets_right) {
        return vec![row_id];
    }

    let meets_left: Vec<&&MatchedSourceRow> =
        sources.iter().filter(|s| s.source.valid_until == t.valid_from).collect();
    if let Some(row_id) = best_of(&meets_left) {
        return vec![row_id];
    }

    sources.iter().map(|s| s.source.row_id).max().into_iter().collect()
}

/// Classify every diff row into a `PlanOperation`, without sequence numbers
/// (those are assigned afterward by [`sequence_statements`]).
pub fn classify_operations(rows: Vec<DiffRow>, ctx: &PlannerContext) -> Vec<PlanOperation> {
    rows.into_iter()
        .map(|row| classify_single_diff(row, ctx))
        .collect()
}

fn classify_single_diff(row: DiffRow, ctx: &PlannerContext) -> PlanOperation {
    let (operation, update_effect) = match (&row.final_interval, &row.target_interval) {
        (Some(_), None) => {
            // FOR_PORTION_OF modes only ever modify a portion of an existing
            // target row; a segment that never overlapped any target row at
            // all is outside the target's timeline and is ignored, not
            // inserted. A segment that did overlap a target row but lost the
            // reuse race (the row split into several final pieces) still
            // becomes an INSERT, since one original row can't become two.
            if ctx.mode == MergeMode::InsertNewEntities && !row.is_new_entity {
                (PlanAction::SkipFiltered, None)
            } else if ctx.mode.is_for_portion_of() && !row.is_new_entity && !row.overlaps_target {
                (PlanAction::SkipFiltered, None)
            } else {
                (PlanAction::Insert, None)
            }
        }
        (None, Some(_)) => {
            if ctx.delete_mode == DeleteMode::None {
                (PlanAction::SkipFiltered, None)
            } else {
                (PlanAction::Delete, None)
            }
        }
        (Some(_), Some(_)) => {
            if ctx.mode == MergeMode::InsertNewEntities {
                (PlanAction::SkipFiltered, None)
            } else if ctx.mode == MergeMode::DeleteForPortionOf && contains_delete_sentinel(&row) {
                (PlanAction::Delete, None)
            } else if data_unchanged(&row) {
                (PlanAction::SkipIdentical, None)
            } else {
                let effect = compute_update_effect(&row);
                (PlanAction::Update, Some(effect))
            }
        }
        (None, None) => (PlanAction::SkipFiltered, None),
    };

    PlanOperation {
        plan_op_seq: 0,
        statement_seq: 0,
        row_ids: row.row_ids,
        operation,
        update_effect,
        correlation_id: row.correlation_id,
        is_new_entity: row.is_new_entity,
        identity_keys: Some(row.identity_keys),
        lookup_keys: row.target_lookup_keys,
        pk_payload: row.target_pk_payload,
        s_t_relation: row.s_t_relation,
        old_interval: row.target_interval,
        new_interval: row.final_interval,
        data: row.final_payload,
        feedback_message: None,
        trace: None,
        grouping_key: row.grouping_key,
    }
}

/// `DELETE_FOR_PORTION_OF` marks the rows it wants removed with the
/// `Value::Delete` sentinel rather than by omission, since the segment still
/// needs a resolved payload to flow through resolution and coalescing like
/// any other mode.
fn contains_delete_sentinel(row: &DiffRow) -> bool {
    row.final_payload
        .as_ref()
        .is_some_and(|p| p.values().any(|v| v.is_delete()))
}

fn data_unchanged(row: &DiffRow) -> bool {
    match (&row.final_payload, &row.target_payload) {
        (Some(a), Some(b)) => {
            payloads_equal_ignoring_nulls(a, b) && row.final_interval == row.target_interval
        }
        (None, None) => true,
        _ => false,
    }
}

/// `NONE` if the timeline is unchanged, `MOVE` if both endpoints shifted,
/// `GROW`/`SHRINK` if the interval strictly expanded/contracted on one side.
fn compute_update_effect(row: &DiffRow) -> UpdateEffect {
    let (Some(new), Some(old)) = (&row.final_interval, &row.target_interval) else {
        return UpdateEffect::None;
    };
    if new == old {
        return UpdateEffect::None;
    }
    let from_moved = new.valid_from != old.valid_from;
    let until_moved = new.valid_until != old.valid_until;
    let grew = new.valid_from <= old.valid_from && new.valid_until >= old.valid_until;
    let shrank = new.valid_from >= old.valid_from && new.valid_until <= old.valid_until;
    if from_moved && until_moved && !grew && !shrank {
        UpdateEffect::Move
    } else if grew {
        UpdateEffect::Grow
    } else if shrank {
        UpdateEffect::Shrink
    } else {
        UpdateEffect::Move
    }
}

/// Assign `plan_op_seq` (global plan order) and `statement_seq` (an
/// executable batch number): DELETE, then UPDATE(NONE/SHRINK), then one batch
/// per MOVE, then UPDATE(GROW), then INSERT — the order the executor depends
/// on to avoid transient constraint violations.
pub fn sequence_statements(mut ops: Vec<PlanOperation>) -> Vec<PlanOperation> {
    let batch_of = |op: &PlanOperation| -> i32 {
        match (op.operation, op.update_effect) {
            (PlanAction::Delete, _) => 1,
            (PlanAction::Update, Some(UpdateEffect::None) | Some(UpdateEffect::Shrink)) => 2,
            (PlanAction::Update, Some(UpdateEffect::Move)) => 3,
            (PlanAction::Update, Some(UpdateEffect::Grow)) => 4,
            (PlanAction::Insert, _) => 5,
            _ => 6,
        }
    };
    let mut indexed: Vec<(usize, PlanOperation)> = ops.drain(..).enumerate().collect();
    indexed.sort_by_key(|(i, op)| (batch_of(op), *i));
    for (seq, (_, op)) in indexed.iter_mut().enumerate() {
        op.plan_op_seq = seq as i64;
        op.statement_seq = batch_of(op);
    }
    indexed.into_iter().map(|(_, op)| op).collect()
}
