//! Entity correlation and interval deconstruction (the "sweep line").
//!
//! Every source and target row is reduced to a `grouping_key: String` that
//! names the entity it belongs to, built from typed `Payload` column values
//! rather than a canonicalized JSON object.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::PlannerContext;
use crate::error::MergeError;
use crate::types::{AtomicSegment, MatchedSourceRow, PlanAction, SourceRow, TargetRow, Temporal};
use crate::value::Value;

/// Build a stable string key from a set of column values, used both as the
/// entity grouping key and (for natural keys) the correlation key.
pub fn build_key_for_cols(cols: &[String], payload: &BTreeMap<String, Value>) -> Option<String> {
    let mut parts = Vec::with_capacity(cols.len());
    for col in cols {
        match payload.get(col) {
            Some(v) if !v.is_null() => parts.push(format!("{col}={v}")),
            _ => return None,
        }
    }
    Some(parts.join("\u{1}"))
}

/// Resolve a grouping key for a source row: prefer a stable identity match,
/// then try each lookup key set in order (OR logic), then fall back to the
/// correlation id for a founding (not-yet-created) entity.
fn resolve_grouping_key(
    row: &SourceRow,
    ctx: &PlannerContext,
    target_index: &TargetIndex,
) -> Option<(String, bool, Option<BTreeMap<String, Value>>)> {
    if !ctx.identity_columns.is_empty() {
        if let Some(key) = build_key_for_cols(&ctx.identity_columns, &row.identity_keys) {
            let exists = target_index.by_identity.contains_key(&key);
            return Some((format!("id:{key}"), !exists, None));
        }
    }
    for set in &ctx.lookup_key_sets {
        if let Some(key) = build_key_for_cols(set, &row.lookup_keys) {
            if let Some(discovered) = target_index.by_lookup.get(&key) {
                return Some((format!("lk:{key}"), false, Some(discovered.clone())));
            }
            return Some((format!("lk:{key}"), true, None));
        }
    }
    row.correlation_id
        .as_ref()
        .map(|c| (format!("corr:{c}"), true, None))
}

/// Index of target rows by identity and by each lookup key set, built once
/// per call.
pub struct TargetIndex {
    by_identity: BTreeMap<String, usize>,
    by_lookup: BTreeMap<String, BTreeMap<String, Value>>,
}

pub fn build_target_index(targets: &[TargetRow], ctx: &PlannerContext) -> TargetIndex {
    let mut by_identity = BTreeMap::new();
    let mut by_lookup = BTreeMap::new();
    for (i, t) in targets.iter().enumerate() {
        if let Some(key) = build_key_for_cols(&ctx.identity_columns, &t.identity_keys) {
            by_identity.entry(key).or_insert(i);
        }
        for set in &ctx.lookup_key_sets {
            if let Some(key) = build_key_for_cols(set, &t.lookup_keys) {
                by_lookup.entry(key).or_insert_with(|| t.identity_keys.clone());
            }
        }
    }
    TargetIndex { by_identity, by_lookup }
}

/// Correlate every source row to an entity grouping key, flagging rows with
/// no usable identity/lookup/correlation data as `SKIP_FILTERED`.
pub fn correlate_entities(
    rows: Vec<SourceRow>,
    ctx: &PlannerContext,
    target_index: &TargetIndex,
) -> Vec<MatchedSourceRow> {
    rows.into_iter()
        .map(|row| {
            if !row.is_identifiable {
                let early_feedback = Some((
                    PlanAction::SkipFiltered,
                    Some("source row lacks identifiable data".to_string()),
                ));
                return MatchedSourceRow {
                    grouping_key: format!("unmatched:{}", row.row_id),
                    is_new_entity: true,
                    discovered_identity: None,
                    early_feedback,
                    is_eclipsed: false,
                    source: row,
                };
            }
            match resolve_grouping_key(&row, ctx, target_index) {
                Some((grouping_key, is_new_entity, discovered_identity)) => MatchedSourceRow {
                    source: row,
                    is_new_entity,
                    grouping_key,
                    discovered_identity,
                    early_feedback: None,
                    is_eclipsed: false,
                },
                None => {
                    let early_feedback = Some((
                        PlanAction::SkipFiltered,
                        Some("source row has no identity, lookup, or correlation key".to_string()),
                    ));
                    MatchedSourceRow {
                        grouping_key: format!("unmatched:{}", row.row_id),
                        is_new_entity: true,
                        discovered_identity: None,
                        early_feedback,
                        is_eclipsed: false,
                        source: row,
                    }
                }
            }
        })
        .collect()
}

/// Within each not-yet-created entity's correlation partition, mark a source
/// row `SKIP_ECLIPSED` if later rows (by row id) jointly cover its interval.
pub fn detect_eclipsed(rows: &mut [MatchedSourceRow]) {
    let mut by_group: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, r) in rows.iter().enumerate() {
        if r.is_new_entity && r.early_feedback.is_none() {
            by_group.entry(r.grouping_key.clone()).or_default().push(i);
        }
    }
    for indices in by_group.values() {
        if indices.len() < 2 {
            continue;
        }
        for &i in indices {
            let (from_i, until_i, row_id_i) = {
                let r = &rows[i];
                (r.source.valid_from.clone(), r.source.valid_until.clone(), r.source.row_id)
            };
            let mut covered: Vec<(Temporal, Temporal)> = indices
                .iter()
                .filter(|&&j| j != i && rows[j].source.row_id > row_id_i)
                .map(|&j| (rows[j].source.valid_from.clone(), rows[j].source.valid_until.clone()))
                .collect();
            if covered.is_empty() {
                continue;
            }
            covered.sort();
            if multirange_contains(&covered, &from_i, &until_i) {
                rows[i].is_eclipsed = true;
            }
        }
    }
}

fn multirange_contains(ranges: &[(Temporal, Temporal)], from: &Temporal, until: &Temporal) -> bool {
    let mut cursor = from.clone();
    for (f, u) in ranges {
        if f > &cursor {
            return false;
        }
        if u > &cursor {
            cursor = u.clone();
        }
        if cursor >= *until {
            return true;
        }
    }
    cursor >= *until
}

/// All time boundaries (source and target) touching one entity, used to cut
/// atomic segments.
pub fn collect_boundaries(sources: &[&MatchedSourceRow], targets: &[&TargetRow]) -> BTreeSet<TemporalKey> {
    let mut boundaries = BTreeSet::new();
    for s in sources {
        boundaries.insert(TemporalKey(s.source.valid_from.clone()));
        boundaries.insert(TemporalKey(s.source.valid_until.clone()));
    }
    for t in targets {
        boundaries.insert(TemporalKey(t.valid_from.clone()));
        boundaries.insert(TemporalKey(t.valid_until.clone()));
    }
    boundaries
}

/// `Temporal` (`Bound<i64>`) doesn't implement `Ord` by itself usefully for a
/// `BTreeSet` without importing `interval::Bound`'s impl; this newtype just
/// makes the intent at the call site explicit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TemporalKey(pub Temporal);

/// Cut one entity's source+target rows into atomic segments at every boundary
/// in `collect_boundaries`'s output.
pub fn build_atomic_segments(
    grouping_key: &str,
    is_new_entity: bool,
    identity_keys: &BTreeMap<String, Value>,
    correlation_id: Option<&str>,
    sources: &[&MatchedSourceRow],
    targets: &[&TargetRow],
) -> Result<Vec<AtomicSegment>, MergeError> {
    let boundaries = collect_boundaries(sources, targets);
    let points: Vec<Temporal> = boundaries.into_iter().map(|b| b.0).collect();
    if points.len() < 2 {
        return Ok(Vec::new());
    }

    let mut segments = Vec::with_capacity(points.len() - 1);
    for window in points.windows(2) {
        let (from, until) = (window[0].clone(), window[1].clone());
        let interval = crate::interval::Interval::new(from, until)
            .map_err(MergeError::planner_internal)?;
        segments.push(AtomicSegment {
            grouping_key: grouping_key.to_string(),
            interval,
            is_new_entity,
            identity_keys: identity_keys.clone(),
            correlation_id: correlation_id.map(str::to_string),
        });
    }
    Ok(segments)
}
