//! Payload resolution: for each atomic segment, decide which source row(s)
//! contribute data and strip nulls per mode semantics.

use std::collections::BTreeMap;

use crate::catalog::PlannerContext;
use crate::config::MergeMode;
use crate::types::{AtomicSegment, MatchedSourceRow, ResolvedSegment, TargetRow};
use crate::value::{payloads_equal_ignoring_nulls, strip_nulls, Payload, Value};

/// Resolve one atomic segment's payload from the source row(s) and target
/// row whose intervals cover it.
pub fn resolve_payloads(
    segments: Vec<AtomicSegment>,
    sources: &[&MatchedSourceRow],
    targets: &[&TargetRow],
    mode: MergeMode,
    ctx: &PlannerContext,
) -> Vec<ResolvedSegment> {
    let drop_uncovered_gaps = ctx.delete_mode.deletes_timeline();
    segments
        .into_iter()
        .map(|seg| resolve_one(seg, sources, targets, mode, ctx, drop_uncovered_gaps))
        // A segment with no resolved payload — either a true gap the source
        // never touched, or a target-only gap under a delete_mode that deletes
        // missing timeline — has nothing to carry forward. Dropping it here
        // (rather than keeping an empty placeholder) lets the diff step see the
        // target's original interval as no longer covered and plan a DELETE for it.
        .filter(|resolved| resolved.data_payload.is_some())
        .collect()
}

fn resolve_one(
    seg: AtomicSegment,
    sources: &[&MatchedSourceRow],
    targets: &[&TargetRow],
    mode: MergeMode,
    ctx: &PlannerContext,
    drop_uncovered_gaps: bool,
) -> ResolvedSegment {
    let covering_sources: Vec<&&MatchedSourceRow> = sources
        .iter()
        .filter(|s| s.source.interval().intersects(&seg.interval))
        .collect();
    let covering_target = targets.iter().find(|t| t.interval().intersects(&seg.interval));

    let mut row_ids: Vec<i64> = covering_sources.iter().map(|s| s.source.row_id).collect();
    row_ids.sort_unstable();

    let target_data_payload = covering_target.map(|t| t.data_payload.clone());

    let s_t_relation = match (covering_sources.first(), covering_target) {
        (Some(s), Some(t)) => Some(crate::interval::AllenRelation::compute(
            &s.source.interval(),
            &t.interval(),
        )),
        _ => None,
    };

    let has_source_coverage = !covering_sources.is_empty();
    let has_target_coverage = covering_target.is_some();

    let (data_payload, ephemeral_payload) = if has_source_coverage {
        let winner = if mode.is_last_writer_wins() {
            covering_sources.iter().max_by_key(|s| s.source.row_id).copied()
        } else {
            covering_sources.first().copied()
        };
        resolve_source_payload(winner.as_ref(), covering_target, mode, ctx)
    } else if let Some(t) = covering_target {
        // Under a delete_mode that deletes missing timeline, a gap with no
        // source coverage is dropped from the final timeline rather than
        // carried forward unchanged, so the diff sees the target's original
        // interval as no longer present and plans a DELETE for it.
        if drop_uncovered_gaps {
            (None, None)
        } else {
            (Some(t.data_payload.clone()), Some(t.ephemeral_payload.clone()))
        }
    } else {
        (None, None)
    };

    let data_hash = data_payload.as_ref().map(crate::value::data_hash);

    ResolvedSegment {
        grouping_key: seg.grouping_key,
        interval: seg.interval,
        is_new_entity: seg.is_new_entity,
        identity_keys: seg.identity_keys,
        correlation_id: seg.correlation_id,
        row_ids,
        data_payload,
        ephemeral_payload,
        target_data_payload,
        data_hash,
        has_source_coverage,
        has_target_coverage,
        s_t_relation,
    }
}

/// Merge a winning source row's data onto the covering target row (if any),
/// per the mode table: PATCH-family modes strip nulls from the source before
/// merging ("no opinion" on that column); every other mode takes the source
/// payload as-is, so an explicit source NULL overwrites the target.
/// DELETE_FOR_PORTION_OF ignores the source payload entirely and instead
/// marks the covering target row's columns with the `Value::Delete` sentinel.
fn resolve_source_payload(
    winner: Option<&&&MatchedSourceRow>,
    target: Option<&&TargetRow>,
    mode: MergeMode,
    ctx: &PlannerContext,
) -> (Option<Payload>, Option<Payload>) {
    if mode == MergeMode::DeleteForPortionOf {
        return (
            Some(delete_sentinel_payload(target.map(|t| &t.data_payload))),
            target.map(|t| t.ephemeral_payload.clone()),
        );
    }

    let Some(winner) = winner else {
        return (
            target.map(|t| t.data_payload.clone()),
            target.map(|t| t.ephemeral_payload.clone()),
        );
    };
    let (source_data, source_ephemeral) = if mode.is_patch() {
        (strip_nulls(&winner.source.data_payload), strip_nulls(&winner.source.ephemeral_payload))
    } else {
        (winner.source.data_payload.clone(), winner.source.ephemeral_payload.clone())
    };

    let merged_data = match (mode.is_patch(), target) {
        (true, Some(t)) => {
            let mut merged = t.data_payload.clone();
            merged.extend(source_data);
            merged
        }
        _ => apply_not_null_default_fallback(source_data, target, ctx),
    };
    let merged_ephemeral = match target {
        Some(t) if mode.is_patch() => {
            let mut merged = t.ephemeral_payload.clone();
            merged.extend(source_ephemeral);
            merged
        }
        _ => source_ephemeral,
    };

    (Some(merged_data), Some(merged_ephemeral))
}

/// Every column of the covering target row, set to `Value::Delete`; this is
/// `DELETE_FOR_PORTION_OF`'s `s_data ← DELETE` / `final = ∅` rule.
fn delete_sentinel_payload(target_data: Option<&Payload>) -> Payload {
    target_data
        .map(|data| data.keys().cloned().map(|k| (k, Value::Delete)).collect())
        .unwrap_or_default()
}

/// For REPLACE/UPSERT-family modes, a column that is `NOT NULL DEFAULT ...`
/// and arrives NULL (or absent) in the source falls back to the existing
/// target value instead of being sent as an explicit NULL.
fn apply_not_null_default_fallback(
    source_data: Payload,
    target: Option<&&TargetRow>,
    ctx: &PlannerContext,
) -> BTreeMap<String, Value> {
    let Some(t) = target else { return source_data };
    let mut merged = source_data;
    for col in &ctx.not_null_with_default {
        let is_null_or_missing = merged.get(col).map(|v| v.is_null()).unwrap_or(true);
        if is_null_or_missing {
            match t.data_payload.get(col) {
                Some(v) => {
                    merged.insert(col.clone(), v.clone());
                }
                None => {
                    merged.remove(col);
                }
            }
        }
    }
    merged
}

/// True if a resolved segment's data is identical to what's already in the
/// target, ignoring nulls — used to emit `SKIP_IDENTICAL` during diffing.
pub fn is_identical_to_target(seg: &ResolvedSegment) -> bool {
    match (&seg.data_payload, &seg.target_data_payload) {
        (Some(a), Some(b)) => payloads_equal_ignoring_nulls(a, b),
        (None, None) => true,
        _ => false,
    }
}
