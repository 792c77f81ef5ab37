//! Executor: apply a sequenced plan to the target table via a `DmlSink`.
//!
//! DML order is fixed to avoid transient FK/uniqueness violations: founding
//! inserts run first (so later steps can resolve the identities they
//! generate), then everything else runs in `statement_seq` order — DELETE,
//! then UPDATEs from SHRINK through GROW, then the remaining INSERTs last.
//! Constraints are deferred for the duration of the batch and restored on
//! every return path.

use crate::error::MergeError;
use crate::types::{FeedbackRow, PlanAction, PlanOperation};

/// Key an existing target row back to its newly-generated identity after a
/// founding insert, so later operations on the same (correlation-keyed)
/// entity can resolve to the real key.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub correlation_id: String,
    pub identity: crate::value::Payload,
}

#[derive(Debug, Clone)]
pub struct FoundingInsert {
    pub correlation_id: String,
    pub op: PlanOperation,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexHint {
    pub suggestion: &'static str,
}

/// The executor's trait boundary: everything needed to apply a plan to a
/// real target table. A real implementation wraps a database connection; the
/// crate's `testkit::InMemorySink` plays this role for tests.
pub trait DmlSink {
    fn insert_founding(&mut self, rows: &[FoundingInsert]) -> Result<Vec<GeneratedKey>, MergeError>;
    fn insert(&mut self, rows: &[PlanOperation]) -> Result<(), MergeError>;
    fn update(&mut self, rows: &[PlanOperation]) -> Result<(), MergeError>;
    fn delete(&mut self, rows: &[PlanOperation]) -> Result<(), MergeError>;
    fn defer_constraints(&mut self) -> Result<(), MergeError>;
    fn restore_constraints(&mut self) -> Result<(), MergeError>;
    fn index_hints(&self, source_rows: usize, target_rows: usize) -> Vec<IndexHint> {
        let _ = (source_rows, target_rows);
        Vec::new()
    }
}

/// Restores constraint state on drop, whether `execute_plan` returns `Ok` or
/// propagates an error via `?` — a drop guard in place of a try/finally.
struct ConstraintGuard<'a, S: DmlSink + ?Sized> {
    sink: &'a mut S,
    done: bool,
}

impl<'a, S: DmlSink + ?Sized> Drop for ConstraintGuard<'a, S> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.sink.restore_constraints();
        }
    }
}

/// Apply a sequenced plan in its fixed order:
/// 1. founding inserts, 2. backfill generated identities into dependent ops,
/// 3. everything else by ascending `statement_seq` — DELETEs, then UPDATEs
///    from SHRINK through GROW, then the remaining INSERTs.
pub fn execute_plan(
    sink: &mut dyn DmlSink,
    ops: Vec<PlanOperation>,
    log_index_checks: bool,
) -> Result<Vec<FeedbackRow>, MergeError> {
    if log_index_checks {
        let hints = sink.index_hints(ops.len(), ops.len());
        for h in hints {
            tracing::debug!(suggestion = h.suggestion, "index check");
        }
    }

    sink.defer_constraints()?;
    let mut guard = ConstraintGuard { sink, done: false };
    let result = run_steps(guard.sink, ops);
    guard.sink.restore_constraints()?;
    guard.done = true;
    result
}

fn run_steps(sink: &mut dyn DmlSink, mut ops: Vec<PlanOperation>) -> Result<Vec<FeedbackRow>, MergeError> {
    let mut feedback = Vec::new();

    let founding: Vec<FoundingInsert> = ops
        .iter()
        .filter(|op| op.operation == PlanAction::Insert && op.is_new_entity)
        .filter_map(|op| {
            op.correlation_id.clone().map(|correlation_id| FoundingInsert {
                correlation_id,
                op: op.clone(),
            })
        })
        .collect();

    if !founding.is_empty() {
        let generated = sink.insert_founding(&founding)?;
        backfill_generated_identities(&mut ops, &generated);
    }

    let founding_seqs: std::collections::BTreeSet<i64> = ops
        .iter()
        .filter(|op| {
            op.operation == PlanAction::Insert
                && op.is_new_entity
                && founding.iter().any(|f| Some(&f.correlation_id) == op.correlation_id.as_ref())
        })
        .map(|op| op.plan_op_seq)
        .collect();

    // Everything else runs in `statement_seq` order (DELETE, then UPDATEs
    // from SHRINK through GROW, then INSERT last), which is the order that
    // avoids transient overlap/uniqueness violations on the target's
    // timeline. Ops sharing a `statement_seq` also share one `PlanAction`
    // (assigned together by `sequence_statements`), so each contiguous run
    // dispatches to a single sink call.
    let mut rest: Vec<PlanOperation> = ops
        .iter()
        .filter(|op| !founding_seqs.contains(&op.plan_op_seq))
        .cloned()
        .collect();
    rest.sort_by_key(|op| (op.statement_seq, op.plan_op_seq));

    let mut i = 0;
    while i < rest.len() {
        let statement_seq = rest[i].statement_seq;
        let action = rest[i].operation;
        let mut j = i + 1;
        while j < rest.len() && rest[j].statement_seq == statement_seq {
            j += 1;
        }
        let batch = &rest[i..j];
        match action {
            PlanAction::Delete => sink.delete(batch)?,
            PlanAction::Update => sink.update(batch)?,
            PlanAction::Insert => sink.insert(batch)?,
            _ => {}
        }
        i = j;
    }

    for op in &ops {
        feedback.push(FeedbackRow {
            row_id: op.row_ids.first().copied().unwrap_or(-1),
            target_entity_keys: op.identity_keys.clone(),
            status: op.operation,
            message: op.feedback_message.clone(),
        });
    }

    Ok(feedback)
}

fn backfill_generated_identities(ops: &mut [PlanOperation], generated: &[GeneratedKey]) {
    for op in ops.iter_mut() {
        if let Some(correlation_id) = &op.correlation_id {
            if let Some(g) = generated.iter().find(|g| &g.correlation_id == correlation_id) {
                let needs_identity = match &op.identity_keys {
                    None => true,
                    Some(ik) => ik.is_empty(),
                };
                if needs_identity {
                    op.identity_keys = Some(g.identity.clone());
                }
            }
        }
    }
}
