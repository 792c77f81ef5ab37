//! A storage-agnostic temporal merge engine: reconciles a batch of source
//! rows against a bitemporal target table under one of eight declarative
//! merge modes, producing a sequenced DML plan and per-row feedback.
//!
//! The engine never touches a database itself. A caller supplies the target
//! table's shape through [`catalog::CatalogReader`], the source batch through
//! [`BatchSource`], and a way to apply the resulting plan through
//! [`executor::DmlSink`]. [`temporal_merge`] composes planning and execution
//! end to end; [`plan_merge`] exposes planning alone for callers that want to
//! inspect a plan before applying it.

pub mod cache;
pub mod catalog;
pub mod coalesce;
pub mod config;
pub mod diff;
pub mod error;
pub mod executor;
pub mod feedback;
pub mod interval;
pub mod resolve;
pub mod segment;
pub mod types;
pub mod value;

/// In-memory `CatalogReader`/`BatchSource`/`DmlSink` implementations used by
/// this crate's own tests and available to downstream integration tests that
/// want a database-free target to exercise the engine against.
pub mod testkit;

use std::collections::BTreeMap;

use catalog::{CatalogReader, PlannerContext, TableId};
use config::MergeRequest;
use error::MergeError;
use types::{FeedbackRow, PlanOperation, SourceRow, TargetRow};

/// Supplies the source batch and the target table's current rows for the
/// entities touched by that batch. Kept separate from `CatalogReader` because
/// a source is usually a query result or an in-memory batch, not a catalog
/// fact.
pub trait BatchSource {
    fn source_rows(&self) -> Result<Vec<SourceRow>, MergeError>;
    fn target_rows_for(
        &self,
        identity_or_lookup_keys: &[BTreeMap<String, value::Value>],
    ) -> Result<Vec<TargetRow>, MergeError>;
    fn source_columns(&self) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub operations: Vec<PlanOperation>,
}

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub plan: Plan,
    pub feedback: Vec<FeedbackRow>,
}

/// Validate the request, introspect the catalog (or hit the plan cache),
/// correlate entities, cut atomic segments, resolve payloads, coalesce
/// islands, diff against the target, and classify + sequence the resulting
/// operations. Does not touch the target table.
pub fn plan_merge(
    request: &MergeRequest,
    target: &TableId,
    catalog: &dyn CatalogReader,
    source: &dyn BatchSource,
) -> Result<Plan, MergeError> {
    let source_cols = source.source_columns();
    request.validate(&source_cols)?;

    let cache_key = cache::compute_cache_key(&cache::CacheKeyInput {
        target_name: &target.0,
        era_name: &request.era_name,
        mode: request.mode,
        delete_mode: request.delete_mode,
        identity_columns: &request.identity_columns,
        lookup_key_sets: &request.lookup_key_sets,
        row_id_column: &request.row_id_column,
        correlation_column: request.correlation_column.as_deref(),
        source_columns: &source_cols,
    });

    let ctx = if let Some(cached) = cache::get(cache_key) {
        tracing::debug!(cache_key, "plan cache hit");
        cached.ctx
    } else {
        tracing::debug!(cache_key, "plan cache miss, introspecting catalog");
        let ctx = build_context(request, target, catalog)?;
        cache::insert(cache_key, cache::CachedPlanTemplate { ctx: ctx.clone() });
        ctx
    };

    let source_rows = source.source_rows()?;
    let lookup_keys: Vec<BTreeMap<String, value::Value>> = source_rows
        .iter()
        .map(|r| {
            let mut keys = r.identity_keys.clone();
            keys.extend(r.lookup_keys.clone());
            keys
        })
        .collect();
    let target_rows = source.target_rows_for(&lookup_keys)?;

    let target_index = segment::build_target_index(&target_rows, &ctx);
    let mut matched = segment::correlate_entities(source_rows, &ctx, &target_index);
    segment::detect_eclipsed(&mut matched);

    let mut groups: BTreeMap<String, (Vec<&types::MatchedSourceRow>, Vec<&TargetRow>)> = BTreeMap::new();
    for row in matched.iter().filter(|r| r.early_feedback.is_none() && !r.is_eclipsed) {
        groups.entry(row.grouping_key.clone()).or_default().0.push(row);
    }
    for t in &target_rows {
        if let Some(key) = segment::build_key_for_cols(&ctx.identity_columns, &t.identity_keys) {
            groups.entry(format!("id:{key}")).or_default().1.push(t);
        }
    }

    let mut all_ops = Vec::new();
    for (key, (sources, targets)) in &groups {
        if sources.is_empty() {
            continue;
        }
        let is_new_entity = sources.iter().all(|s| s.is_new_entity);
        let identity_keys = sources
            .iter()
            .find_map(|s| s.discovered_identity.clone())
            .unwrap_or_else(|| sources[0].source.identity_keys.clone());
        let correlation_id = sources[0].source.correlation_id.clone();

        // A FOR_PORTION_OF mode only ever narrows or deletes an existing
        // target row's timeline; an entity with source rows but no matching
        // target at all has nothing to act on, so every row for it is
        // SKIPPED_NO_TARGET rather than accidentally founding a new entity.
        if request.mode.is_for_portion_of() && targets.is_empty() {
            for s in sources {
                all_ops.push(PlanOperation {
                    plan_op_seq: 0,
                    statement_seq: 0,
                    row_ids: vec![s.source.row_id],
                    operation: types::PlanAction::SkipNoTarget,
                    update_effect: None,
                    correlation_id: s.source.correlation_id.clone(),
                    is_new_entity: s.is_new_entity,
                    identity_keys: None,
                    lookup_keys: None,
                    pk_payload: None,
                    s_t_relation: None,
                    old_interval: None,
                    new_interval: None,
                    data: None,
                    feedback_message: Some("no matching target row for a FOR_PORTION_OF mode".to_string()),
                    trace: None,
                    grouping_key: key.clone(),
                });
            }
            continue;
        }

        let atomic = segment::build_atomic_segments(
            key,
            is_new_entity,
            &identity_keys,
            correlation_id.as_deref(),
            sources,
            targets,
        )?;
        let resolved = resolve::resolve_payloads(atomic, sources, targets, request.mode, &ctx);
        let coalesced = coalesce::coalesce_segments(resolved);
        let diff_rows = diff::compute_diff(&coalesced, targets, sources);
        let ops = diff::classify_operations(diff_rows, &ctx);
        all_ops.extend(ops);
    }

    for row in matched.iter().filter(|r| r.early_feedback.is_some()) {
        let (action, message) = row.early_feedback.clone().unwrap();
        all_ops.push(PlanOperation {
            plan_op_seq: 0,
            statement_seq: 0,
            row_ids: vec![row.source.row_id],
            operation: action,
            update_effect: None,
            correlation_id: row.source.correlation_id.clone(),
            is_new_entity: row.is_new_entity,
            identity_keys: None,
            lookup_keys: None,
            pk_payload: None,
            s_t_relation: None,
            old_interval: None,
            new_interval: None,
            data: None,
            feedback_message: message,
            trace: None,
            grouping_key: row.grouping_key.clone(),
        });
    }
    for row in matched.iter().filter(|r| r.is_eclipsed) {
        all_ops.push(PlanOperation {
            plan_op_seq: 0,
            statement_seq: 0,
            row_ids: vec![row.source.row_id],
            operation: types::PlanAction::SkipEclipsed,
            update_effect: None,
            correlation_id: row.source.correlation_id.clone(),
            is_new_entity: row.is_new_entity,
            identity_keys: None,
            lookup_keys: None,
            pk_payload: None,
            s_t_relation: None,
            old_interval: None,
            new_interval: None,
            data: None,
            feedback_message: Some("eclipsed by a later source row".to_string()),
            trace: None,
            grouping_key: row.grouping_key.clone(),
        });
    }

    // Safety net: every source row must be accounted for by at least one plan
    // operation. One that isn't (an unreachable planner gap, not a mode rule)
    // gets a synthetic ERROR so feedback still has exactly one row per
    // source-batch row instead of silently dropping it.
    let covered_row_ids: std::collections::BTreeSet<i64> =
        all_ops.iter().flat_map(|op| op.row_ids.iter().copied()).collect();
    for row in &matched {
        if !covered_row_ids.contains(&row.source.row_id) {
            all_ops.push(PlanOperation {
                plan_op_seq: 0,
                statement_seq: 0,
                row_ids: vec![row.source.row_id],
                operation: types::PlanAction::Error,
                update_effect: None,
                correlation_id: row.source.correlation_id.clone(),
                is_new_entity: row.is_new_entity,
                identity_keys: None,
                lookup_keys: None,
                pk_payload: None,
                s_t_relation: None,
                old_interval: None,
                new_interval: None,
                data: None,
                feedback_message: Some("Planner failed to generate a plan for this source row".to_string()),
                trace: None,
                grouping_key: row.grouping_key.clone(),
            });
        }
    }

    let mut ops = diff::sequence_statements(all_ops);

    if request.options.log_trace {
        for op in &mut ops {
            op.trace = Some(trace_json(op));
        }
    }

    if request.options.log_plan {
        tracing::debug!(op_count = ops.len(), "compiled plan");
    }

    Ok(Plan { operations: ops })
}

/// A JSON snapshot of one plan operation's inputs/outputs, emitted only when
/// `log_trace` is set, for debugging a merge that produced a surprising plan.
fn trace_json(op: &PlanOperation) -> String {
    let snapshot = serde_json::json!({
        "operation": op.operation.as_str(),
        "row_ids": op.row_ids.clone(),
        "s_t_relation": op.s_t_relation.map(|r| r.as_str()),
        "old_interval": op.old_interval.as_ref().map(|i| format!("{i:?}")),
        "new_interval": op.new_interval.as_ref().map(|i| format!("{i:?}")),
        "data": op.data.clone(),
    });
    serde_json::to_string(&snapshot).unwrap_or_default()
}

fn build_context(
    request: &MergeRequest,
    target: &TableId,
    catalog: &dyn CatalogReader,
) -> Result<PlannerContext, MergeError> {
    let era = catalog.era(target, &request.era_name)?;
    let mut temporal_cols = vec![era.valid_from_col.clone()];
    if let Some(ref vt) = era.valid_to_col {
        temporal_cols.push(vt.clone());
    }
    temporal_cols.push(era.valid_until_col.clone());

    let pk_cols = catalog.pk_columns(target, &temporal_cols)?;
    let target_catalog = catalog.column_catalog(target)?;

    catalog::build_planner_context(
        request.mode,
        request.delete_mode,
        era,
        request.identity_columns.clone(),
        request.lookup_key_sets.clone(),
        pk_cols,
        request.ephemeral_columns.clone(),
        request.founding_id_column.clone(),
        request.row_id_column.clone(),
        request.correlation_column.clone(),
        &target_catalog,
    )
}

/// Plan, then apply the plan through `sink`, then aggregate per-row feedback.
pub fn temporal_merge(
    request: &MergeRequest,
    target: &TableId,
    catalog: &dyn CatalogReader,
    source: &dyn BatchSource,
    sink: &mut dyn executor::DmlSink,
) -> Result<MergeReport, MergeError> {
    let plan = plan_merge(request, target, catalog, source)?;
    let raw_feedback = executor::execute_plan(sink, plan.operations.clone(), request.options.log_index_checks)?;
    let feedback = feedback::aggregate_feedback(raw_feedback);

    if request.options.log_feedback {
        for row in &feedback {
            tracing::debug!(row_id = row.row_id, status = row.status.as_str(), "feedback");
        }
    }

    Ok(MergeReport { plan, feedback })
}
