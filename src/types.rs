//! Shared domain types threaded through planning and execution: rows,
//! segments, plan operations and feedback.

use crate::interval::{AllenRelation, Bound, Interval};
use crate::value::Payload;

pub type Temporal = Bound<i64>;
pub type TemporalInterval = Interval<i64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlanAction {
    Delete,
    Update,
    Insert,
    SkipIdentical,
    SkipNoTarget,
    SkipFiltered,
    SkipEclipsed,
    Error,
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::SkipIdentical => "SKIP_IDENTICAL",
            Self::SkipNoTarget => "SKIP_NO_TARGET",
            Self::SkipFiltered => "SKIP_FILTERED",
            Self::SkipEclipsed => "SKIP_ECLIPSED",
            Self::Error => "ERROR",
        }
    }

    pub fn is_dml(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }

    /// ERROR > APPLIED > SKIPPED_NO_TARGET > SKIPPED_FILTERED > SKIPPED_ECLIPSED
    /// > SKIPPED_IDENTICAL. Lower wins.
    pub fn feedback_precedence(&self) -> u8 {
        match self {
            Self::Error => 0,
            Self::Insert | Self::Update | Self::Delete => 1,
            Self::SkipNoTarget => 2,
            Self::SkipFiltered => 3,
            Self::SkipEclipsed => 4,
            Self::SkipIdentical => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UpdateEffect {
    None,
    Shrink,
    Move,
    Grow,
}

impl UpdateEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Shrink => "SHRINK",
            Self::Move => "MOVE",
            Self::Grow => "GROW",
        }
    }
}

/// One row read from the source relation.
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub row_id: i64,
    pub correlation_id: Option<String>,
    pub valid_from: Temporal,
    pub valid_until: Temporal,
    pub identity_keys: Payload,
    pub lookup_keys: Payload,
    pub data_payload: Payload,
    pub ephemeral_payload: Payload,
    /// Whether this row carries enough identity/lookup data to be matched
    /// against the target at all.
    pub is_identifiable: bool,
}

impl SourceRow {
    pub fn interval(&self) -> TemporalInterval {
        Interval {
            valid_from: self.valid_from.clone(),
            valid_until: self.valid_until.clone(),
        }
    }
}

/// One row read from the target table.
#[derive(Debug, Clone)]
pub struct TargetRow {
    pub valid_from: Temporal,
    pub valid_until: Temporal,
    pub identity_keys: Payload,
    pub lookup_keys: Payload,
    pub data_payload: Payload,
    pub ephemeral_payload: Payload,
    pub pk_payload: Payload,
}

impl TargetRow {
    pub fn interval(&self) -> TemporalInterval {
        Interval {
            valid_from: self.valid_from.clone(),
            valid_until: self.valid_until.clone(),
        }
    }
}

/// A source row after entity correlation's first pass.
#[derive(Debug, Clone)]
pub struct MatchedSourceRow {
    pub source: SourceRow,
    pub is_new_entity: bool,
    pub grouping_key: String,
    pub discovered_identity: Option<Payload>,
    pub early_feedback: Option<(PlanAction, Option<String>)>,
    pub is_eclipsed: bool,
}

/// A maximal time slice with no internal boundary, for one entity.
#[derive(Debug, Clone)]
pub struct AtomicSegment {
    pub grouping_key: String,
    pub interval: TemporalInterval,
    pub is_new_entity: bool,
    pub identity_keys: Payload,
    pub correlation_id: Option<String>,
}

/// An atomic segment after payload resolution.
#[derive(Debug, Clone)]
pub struct ResolvedSegment {
    pub grouping_key: String,
    pub interval: TemporalInterval,
    pub is_new_entity: bool,
    pub identity_keys: Payload,
    pub correlation_id: Option<String>,
    pub row_ids: Vec<i64>,
    pub data_payload: Option<Payload>,
    pub ephemeral_payload: Option<Payload>,
    pub target_data_payload: Option<Payload>,
    pub data_hash: Option<u64>,
    pub has_source_coverage: bool,
    pub has_target_coverage: bool,
    pub s_t_relation: Option<AllenRelation>,
}

/// Adjacent resolved segments coalesced into islands of identical payload.
#[derive(Debug, Clone)]
pub struct CoalescedSegment {
    pub grouping_key: String,
    pub interval: TemporalInterval,
    pub is_new_entity: bool,
    pub identity_keys: Payload,
    pub correlation_id: Option<String>,
    pub row_ids: Vec<i64>,
    pub data_payload: Option<Payload>,
    pub ephemeral_payload: Option<Payload>,
    pub ancestor_valid_from: Option<Temporal>,
    pub data_hash: Option<u64>,
    pub has_source_coverage: bool,
    pub has_target_coverage: bool,
    pub s_t_relation: Option<AllenRelation>,
}

/// Result of the full outer join between the coalesced timeline and the
/// original target rows.
#[derive(Debug, Clone)]
pub struct DiffRow {
    pub grouping_key: String,
    pub is_new_entity: bool,
    pub identity_keys: Payload,
    pub correlation_id: Option<String>,
    pub row_ids: Vec<i64>,
    pub final_interval: Option<TemporalInterval>,
    pub final_payload: Option<Payload>,
    pub target_interval: Option<TemporalInterval>,
    pub target_payload: Option<Payload>,
    /// True if this segment's interval overlapped some original target row,
    /// even if that row was already claimed as another segment's UPDATE and
    /// so isn't carried as `target_interval` here. Distinguishes a split-off
    /// piece of an existing row (still an INSERT) from a segment that never
    /// touched the target's timeline at all.
    pub overlaps_target: bool,
    pub ephemeral_payload: Option<Payload>,
    pub has_source_coverage: bool,
    pub s_t_relation: Option<AllenRelation>,
    pub target_ephemeral: Option<Payload>,
    pub target_lookup_keys: Option<Payload>,
    pub target_pk_payload: Option<Payload>,
}

/// A single planned DML operation, the crate's primary output.
#[derive(Debug, Clone)]
pub struct PlanOperation {
    pub plan_op_seq: i64,
    pub statement_seq: i32,
    pub row_ids: Vec<i64>,
    pub operation: PlanAction,
    pub update_effect: Option<UpdateEffect>,
    pub correlation_id: Option<String>,
    pub is_new_entity: bool,
    pub identity_keys: Option<Payload>,
    pub lookup_keys: Option<Payload>,
    /// Surrogate key of the original target row this operation's segment was
    /// derived from, carried forward so new slices split off an existing row
    /// keep its identifiers.
    pub pk_payload: Option<Payload>,
    pub s_t_relation: Option<AllenRelation>,
    pub old_interval: Option<TemporalInterval>,
    pub new_interval: Option<TemporalInterval>,
    pub data: Option<Payload>,
    pub feedback_message: Option<String>,
    pub trace: Option<String>,
    pub grouping_key: String,
}

/// Per-source-row outcome of a merge.
#[derive(Debug, Clone)]
pub struct FeedbackRow {
    pub row_id: i64,
    /// The resolved target entity's identity projection, e.g. a
    /// newly-generated surrogate key for a founding insert.
    pub target_entity_keys: Option<Payload>,
    pub status: PlanAction,
    pub message: Option<String>,
}
