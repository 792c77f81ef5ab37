//! Request/session configuration: merge mode, delete mode, tuning knobs.

use std::collections::BTreeSet;

use crate::error::MergeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeMode {
    MergeEntityUpsert,
    UpdateForPortionOf,
    MergeEntityPatch,
    PatchForPortionOf,
    MergeEntityReplace,
    ReplaceForPortionOf,
    InsertNewEntities,
    DeleteForPortionOf,
}

impl MergeMode {
    pub fn is_patch(&self) -> bool {
        matches!(self, Self::MergeEntityPatch | Self::PatchForPortionOf)
    }

    pub fn is_replace(&self) -> bool {
        matches!(self, Self::MergeEntityReplace | Self::ReplaceForPortionOf)
    }

    /// REPLACE-family modes (and the two single-writer modes) are last-writer-wins:
    /// only the highest row id contributes data to an atomic segment. PATCH/UPSERT
    /// accumulate row ids from every source row touching the segment.
    pub fn is_last_writer_wins(&self) -> bool {
        matches!(
            self,
            Self::MergeEntityReplace
                | Self::ReplaceForPortionOf
                | Self::InsertNewEntities
                | Self::DeleteForPortionOf
        )
    }

    pub fn is_for_portion_of(&self) -> bool {
        matches!(
            self,
            Self::UpdateForPortionOf
                | Self::PatchForPortionOf
                | Self::ReplaceForPortionOf
                | Self::DeleteForPortionOf
        )
    }

    pub fn is_entity_scope(&self) -> bool {
        matches!(
            self,
            Self::MergeEntityUpsert
                | Self::MergeEntityPatch
                | Self::MergeEntityReplace
                | Self::InsertNewEntities
        )
    }

    /// Founding-entity creation (source rows with no identity match may insert
    /// a brand-new entity) is only meaningful for entity-scoped modes.
    pub fn allows_founding(&self) -> bool {
        self.is_entity_scope()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteMode {
    None,
    DeleteMissingTimeline,
    DeleteMissingEntities,
    DeleteMissingTimelineAndEntities,
}

impl DeleteMode {
    pub fn deletes_entities(&self) -> bool {
        matches!(
            self,
            Self::DeleteMissingEntities | Self::DeleteMissingTimelineAndEntities
        )
    }

    pub fn deletes_timeline(&self) -> bool {
        matches!(
            self,
            Self::DeleteMissingTimeline | Self::DeleteMissingTimelineAndEntities
        )
    }
}

/// Tuning knobs, plumbed into `tracing` rather than bespoke printing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    pub log_plan: bool,
    pub log_feedback: bool,
    /// There is no SQL to log once DML is behind `DmlSink`, so this is a
    /// documented no-op kept for API parity with callers that still check it.
    pub log_sql: bool,
    pub log_trace: bool,
    pub log_index_checks: bool,
    /// Seeds the synthetic row-id generator in `testkit`; meaningless outside tests.
    pub log_id_seed: Option<u64>,
}

/// One `temporal_merge` invocation's configuration.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub mode: MergeMode,
    pub delete_mode: DeleteMode,
    pub era_name: String,
    pub identity_columns: Vec<String>,
    /// Independent natural-key column sets, tried with OR logic (a source row
    /// matches an existing entity if ANY set matches).
    pub lookup_key_sets: Vec<Vec<String>>,
    pub ephemeral_columns: Vec<String>,
    pub row_id_column: String,
    pub correlation_column: Option<String>,
    pub founding_id_column: Option<String>,
    pub options: SessionOptions,
}

impl MergeRequest {
    /// Eager validation, before any catalog round trip or DML. `source_columns`
    /// lets this check the row id and correlation columns actually exist in
    /// the batch being merged, rather than failing later with a confusing
    /// missing-column error once planning is already underway.
    pub fn validate(&self, source_columns: &[String]) -> Result<(), MergeError> {
        if self.identity_columns.is_empty() && self.lookup_key_sets.iter().all(|s| s.is_empty()) {
            return Err(MergeError::invalid_config(
                "at least one identity column or lookup key set is required",
            ));
        }
        if self.row_id_column.is_empty() {
            return Err(MergeError::invalid_config("row_id_column must not be empty"));
        }
        let cols: BTreeSet<&str> = source_columns.iter().map(String::as_str).collect();
        if !cols.contains(self.row_id_column.as_str()) {
            return Err(MergeError::invalid_config(format!(
                "row_id_column \"{}\" not found in source",
                self.row_id_column
            )));
        }
        if let Some(corr) = &self.correlation_column {
            if !cols.contains(corr.as_str()) {
                return Err(MergeError::invalid_config(format!(
                    "correlation_column \"{corr}\" not found in source"
                )));
            }
        }
        let ephemeral: BTreeSet<&str> = self.ephemeral_columns.iter().map(String::as_str).collect();
        for col in &self.identity_columns {
            if ephemeral.contains(col.as_str()) {
                return Err(MergeError::invalid_config(format!(
                    "column \"{col}\" cannot be both an identity column and ephemeral"
                )));
            }
        }
        for set in &self.lookup_key_sets {
            if set.is_empty() {
                return Err(MergeError::invalid_config(
                    "a lookup key set must name at least one column",
                ));
            }
            for col in set {
                if ephemeral.contains(col.as_str()) {
                    return Err(MergeError::invalid_config(format!(
                        "column \"{col}\" cannot be both a lookup key and ephemeral"
                    )));
                }
            }
        }
        if self.founding_id_column.is_some() && !self.mode.allows_founding() {
            return Err(MergeError::invalid_config(
                "founding_id_column is only meaningful for entity-scoped modes",
            ));
        }
        Ok(())
    }

    pub fn all_lookup_cols(&self) -> Vec<String> {
        let mut cols: BTreeSet<String> = BTreeSet::new();
        for set in &self.lookup_key_sets {
            cols.extend(set.iter().cloned());
        }
        cols.into_iter().collect()
    }
}
