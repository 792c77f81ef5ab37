//! In-memory `CatalogReader`/`BatchSource`/`DmlSink` for tests.
//!
//! Plays the role of a real target table, backed by a plain `Vec<TargetRow>`
//! instead of a database connection, so the engine's planning and execution
//! logic can be exercised without one.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::catalog::{CatalogReader, ColumnCatalog, ColumnInfo, EraMetadata, LogicalType, TableId};
use crate::error::MergeError;
use crate::executor::{DmlSink, FoundingInsert, GeneratedKey};
use crate::types::{PlanAction, PlanOperation, SourceRow, TargetRow};
use crate::value::Value;
use crate::BatchSource;

pub struct FixedCatalog {
    pub era: EraMetadata,
    pub pk_cols: Vec<String>,
    pub columns: ColumnCatalog,
}

impl FixedCatalog {
    pub fn simple(identity_col: &str) -> Self {
        let mut columns = ColumnCatalog::default();
        columns.columns.insert(
            identity_col.to_string(),
            ColumnInfo {
                name: identity_col.to_string(),
                logical_type: LogicalType::Int,
                nullable: false,
                has_default: false,
                is_generated: false,
            },
        );
        FixedCatalog {
            era: EraMetadata {
                range_col: "valid".to_string(),
                valid_from_col: "valid_from".to_string(),
                valid_until_col: "valid_until".to_string(),
                valid_to_col: None,
                range_subtype_is_numeric: true,
                ephemeral_columns: Vec::new(),
            },
            pk_cols: vec![identity_col.to_string()],
            columns,
        }
    }
}

impl CatalogReader for FixedCatalog {
    fn era(&self, _target: &TableId, _era_name: &str) -> Result<EraMetadata, MergeError> {
        Ok(self.era.clone())
    }

    fn pk_columns(&self, _target: &TableId, temporal_cols: &[String]) -> Result<Vec<String>, MergeError> {
        Ok(self
            .pk_cols
            .iter()
            .filter(|c| !temporal_cols.contains(c))
            .cloned()
            .collect())
    }

    fn column_catalog(&self, _table: &TableId) -> Result<ColumnCatalog, MergeError> {
        Ok(self.columns.clone())
    }
}

/// A source batch plus the target's current rows, both held in memory.
pub struct InMemorySource {
    pub rows: Vec<SourceRow>,
    pub target: Mutex<Vec<TargetRow>>,
    pub columns: Vec<String>,
}

impl BatchSource for InMemorySource {
    fn source_rows(&self) -> Result<Vec<SourceRow>, MergeError> {
        Ok(self.rows.clone())
    }

    fn target_rows_for(
        &self,
        _identity_or_lookup_keys: &[BTreeMap<String, Value>],
    ) -> Result<Vec<TargetRow>, MergeError> {
        Ok(self.target.lock().unwrap().clone())
    }

    fn source_columns(&self) -> Vec<String> {
        self.columns.clone()
    }
}

/// A `DmlSink` that applies operations to an in-memory `Vec<TargetRow>`
/// instead of a database, for exercising the executor's ordering and the
/// end-to-end merge behavior in tests.
#[derive(Default)]
pub struct InMemorySink {
    pub target: Vec<TargetRow>,
    pub next_generated_id: i64,
    pub applied_order: Vec<PlanAction>,
}

impl InMemorySink {
    pub fn new(target: Vec<TargetRow>) -> Self {
        InMemorySink {
            target,
            next_generated_id: 1000,
            applied_order: Vec::new(),
        }
    }
}

impl DmlSink for InMemorySink {
    fn insert_founding(&mut self, rows: &[FoundingInsert]) -> Result<Vec<GeneratedKey>, MergeError> {
        let mut generated = Vec::new();
        let mut ids_by_correlation: BTreeMap<String, i64> = BTreeMap::new();
        for f in rows {
            self.applied_order.push(PlanAction::Insert);
            let mut identity = f.op.identity_keys.clone().unwrap_or_default();
            // All founding inserts for the same not-yet-created entity share one
            // generated id, so sibling rows created in the same batch resolve
            // to the same new identity.
            let id = *ids_by_correlation.entry(f.correlation_id.clone()).or_insert_with(|| {
                let id = self.next_generated_id;
                self.next_generated_id += 1;
                id
            });
            identity.insert("id".to_string(), Value::Int(id));
            if let Some(interval) = &f.op.new_interval {
                self.target.push(TargetRow {
                    valid_from: interval.valid_from.clone(),
                    valid_until: interval.valid_until.clone(),
                    identity_keys: identity.clone(),
                    lookup_keys: BTreeMap::new(),
                    data_payload: f.op.data.clone().unwrap_or_default(),
                    ephemeral_payload: BTreeMap::new(),
                    pk_payload: BTreeMap::new(),
                });
            }
            generated.push(GeneratedKey {
                correlation_id: f.correlation_id.clone(),
                identity,
            });
        }
        Ok(generated)
    }

    fn insert(&mut self, rows: &[PlanOperation]) -> Result<(), MergeError> {
        for op in rows {
            self.applied_order.push(PlanAction::Insert);
            if let Some(interval) = &op.new_interval {
                self.target.push(TargetRow {
                    valid_from: interval.valid_from.clone(),
                    valid_until: interval.valid_until.clone(),
                    identity_keys: op.identity_keys.clone().unwrap_or_default(),
                    lookup_keys: op.lookup_keys.clone().unwrap_or_default(),
                    data_payload: op.data.clone().unwrap_or_default(),
                    ephemeral_payload: BTreeMap::new(),
                    pk_payload: op.pk_payload.clone().unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    fn update(&mut self, rows: &[PlanOperation]) -> Result<(), MergeError> {
        for op in rows {
            self.applied_order.push(PlanAction::Update);
            if let (Some(old), Some(new)) = (&op.old_interval, &op.new_interval) {
                if let Some(t) = self
                    .target
                    .iter_mut()
                    .find(|t| t.valid_from == old.valid_from && t.valid_until == old.valid_until)
                {
                    t.valid_from = new.valid_from.clone();
                    t.valid_until = new.valid_until.clone();
                    if let Some(data) = &op.data {
                        t.data_payload = data.clone();
                    }
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, rows: &[PlanOperation]) -> Result<(), MergeError> {
        for op in rows {
            self.applied_order.push(PlanAction::Delete);
            if let Some(old) = &op.old_interval {
                self.target
                    .retain(|t| !(t.valid_from == old.valid_from && t.valid_until == old.valid_until));
            }
        }
        Ok(())
    }

    fn defer_constraints(&mut self) -> Result<(), MergeError> {
        Ok(())
    }

    fn restore_constraints(&mut self) -> Result<(), MergeError> {
        Ok(())
    }
}
