//! Catalog introspection.
//!
//! The planner only ever needs three facts about the target table: its era
//! metadata, its primary-key columns, and its column catalog. `CatalogReader`
//! keeps exactly that surface, so a Postgres-backed implementation is a thin
//! wrapper over a handful of catalog queries, and a test implementation is a
//! plain struct literal.

use std::collections::BTreeMap;

use crate::config::{DeleteMode, MergeMode};
use crate::error::MergeError;

/// Opaque handle to a table in the caller's catalog (an OID in Postgres, a
/// qualified name elsewhere). The planner never inspects this, only passes
/// it back to `CatalogReader`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId(pub String);

impl TableId {
    pub fn new(name: impl Into<String>) -> Self {
        TableId(name.into())
    }
}

/// Era metadata: which columns carry a table's valid-time range.
#[derive(Debug, Clone)]
pub struct EraMetadata {
    pub range_col: String,
    pub valid_from_col: String,
    pub valid_until_col: String,
    pub valid_to_col: Option<String>,
    pub range_subtype_is_numeric: bool,
    pub ephemeral_columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalType {
    Bool,
    Int,
    Float,
    Text,
    Date,
    Timestamp,
    Uuid,
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub has_default: bool,
    /// Generated-always / identity columns are never part of an INSERT
    /// column list the planner builds.
    pub is_generated: bool,
}

/// Full column catalog for one table, keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct ColumnCatalog {
    pub columns: BTreeMap<String, ColumnInfo>,
}

impl ColumnCatalog {
    pub fn get(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.get(name)
    }

    /// Columns that are `NOT NULL DEFAULT ...`: a null source value for one
    /// of these falls back to the column default at DML time rather than
    /// being sent as an explicit NULL.
    pub fn not_null_with_default(&self) -> Vec<String> {
        self.columns
            .values()
            .filter(|c| !c.nullable && c.has_default && !c.is_generated)
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Everything the planner needs to know about the target (and, for
/// `pk_columns`, the source) table's shape.
pub trait CatalogReader {
    fn era(&self, target: &TableId, era_name: &str) -> Result<EraMetadata, MergeError>;
    fn pk_columns(&self, target: &TableId, temporal_cols: &[String]) -> Result<Vec<String>, MergeError>;
    fn column_catalog(&self, table: &TableId) -> Result<ColumnCatalog, MergeError>;
}

/// Everything the planner derives once the `CatalogReader` calls return,
/// combined with the caller's request.
#[derive(Debug, Clone)]
pub struct PlannerContext {
    pub mode: MergeMode,
    pub delete_mode: DeleteMode,
    pub era: EraMetadata,
    pub identity_columns: Vec<String>,
    pub all_lookup_cols: Vec<String>,
    pub lookup_key_sets: Vec<Vec<String>>,
    pub entity_key_cols: Vec<String>,
    pub temporal_cols: Vec<String>,
    pub pk_cols: Vec<String>,
    pub ephemeral_columns: Vec<String>,
    pub founding_id_column: Option<String>,
    pub row_id_column: String,
    pub correlation_column: Option<String>,
    pub not_null_with_default: Vec<String>,
}

impl PlannerContext {
    pub fn is_founding_mode(&self) -> bool {
        self.founding_id_column.is_some()
    }
}

/// Build a `PlannerContext` from catalog facts and the request.
///
/// Two checks can only happen here, not in `MergeRequest::validate`, since
/// they depend on era metadata the catalog round trip just returned: an
/// ephemeral column can't also be one of the era's temporal bounds, and a
/// column the era already treats as a synchronized (ephemeral) column can't
/// be independently named again in `ephemeral_columns`.
pub fn build_planner_context(
    mode: MergeMode,
    delete_mode: DeleteMode,
    era: EraMetadata,
    identity_columns: Vec<String>,
    lookup_key_sets: Vec<Vec<String>>,
    pk_cols: Vec<String>,
    ephemeral_columns: Vec<String>,
    founding_id_column: Option<String>,
    row_id_column: String,
    correlation_column: Option<String>,
    target_catalog: &ColumnCatalog,
) -> Result<PlannerContext, MergeError> {
    let mut temporal_cols = vec![era.valid_from_col.clone()];
    if let Some(ref vt) = era.valid_to_col {
        temporal_cols.push(vt.clone());
    }
    temporal_cols.push(era.valid_until_col.clone());

    for col in &ephemeral_columns {
        if temporal_cols.contains(col) {
            return Err(MergeError::invalid_config(format!(
                "ephemeral column \"{col}\" cannot be a temporal bound column"
            )));
        }
        if era.ephemeral_columns.contains(col) {
            return Err(MergeError::invalid_config(format!(
                "column \"{col}\" is already a synchronized column for this era and cannot be listed in ephemeral_columns again"
            )));
        }
    }

    let mut all_lookup_cols: Vec<String> = lookup_key_sets.iter().flatten().cloned().collect();
    all_lookup_cols.sort();
    all_lookup_cols.dedup();

    let mut entity_key_cols: Vec<String> = identity_columns
        .iter()
        .chain(all_lookup_cols.iter())
        .chain(pk_cols.iter())
        .filter(|c| !temporal_cols.contains(c))
        .cloned()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    entity_key_cols.sort();

    let mut all_ephemeral = ephemeral_columns;
    for col in &era.ephemeral_columns {
        if !all_ephemeral.contains(col) {
            all_ephemeral.push(col.clone());
        }
    }
    all_ephemeral.sort();
    all_ephemeral.dedup();

    Ok(PlannerContext {
        mode,
        delete_mode,
        era,
        identity_columns,
        all_lookup_cols,
        lookup_key_sets,
        entity_key_cols,
        temporal_cols,
        pk_cols,
        ephemeral_columns: all_ephemeral,
        founding_id_column,
        row_id_column,
        correlation_column,
        not_null_with_default: target_catalog.not_null_with_default(),
    })
}
