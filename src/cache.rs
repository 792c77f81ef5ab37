//! Plan cache: content-addressed, process-scoped, immutable once compiled.
//!
//! The cache key hashes a structural tuple (target, identity/lookup columns,
//! mode, era, row id column, source column set) with xxh3, for consistency
//! with the rest of the crate's hashing (`value::data_hash`).

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::catalog::PlannerContext;
use crate::config::{DeleteMode, MergeMode};

#[derive(Debug, Clone)]
pub struct CachedPlanTemplate {
    pub ctx: PlannerContext,
}

fn cache() -> &'static Mutex<HashMap<u64, CachedPlanTemplate>> {
    static CACHE: OnceLock<Mutex<HashMap<u64, CachedPlanTemplate>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The structural key: target identity, identity/lookup column sets, mode,
/// era name, row id/correlation column names, delete mode, plus a hash of
/// the source column set so a differently-shaped source invalidates a stale
/// entry.
pub struct CacheKeyInput<'a> {
    pub target_name: &'a str,
    pub era_name: &'a str,
    pub mode: MergeMode,
    pub delete_mode: DeleteMode,
    pub identity_columns: &'a [String],
    pub lookup_key_sets: &'a [Vec<String>],
    pub row_id_column: &'a str,
    pub correlation_column: Option<&'a str>,
    pub source_columns: &'a [String],
}

pub fn compute_cache_key(input: &CacheKeyInput) -> u64 {
    let mut buf = String::new();
    buf.push_str(input.target_name);
    buf.push('\0');
    buf.push_str(input.era_name);
    buf.push('\0');
    buf.push_str(&format!("{:?}", input.mode));
    buf.push('\0');
    buf.push_str(&format!("{:?}", input.delete_mode));
    buf.push('\0');
    for c in input.identity_columns {
        buf.push_str(c);
        buf.push(',');
    }
    buf.push('\0');
    for set in input.lookup_key_sets {
        buf.push_str(&set.join(","));
        buf.push(';');
    }
    buf.push('\0');
    buf.push_str(input.row_id_column);
    buf.push('\0');
    buf.push_str(input.correlation_column.unwrap_or(""));
    buf.push('\0');
    buf.push_str(&hash_source_cols(input.source_columns).to_string());
    xxhash_rust::xxh3::xxh3_64(buf.as_bytes())
}

/// Separate hash exposed so a caller can cheaply check "did the source
/// relation's shape change" without recomputing the whole cache key.
pub fn hash_source_cols(cols: &[String]) -> u64 {
    let joined = cols.join(",");
    xxhash_rust::xxh3::xxh3_64(joined.as_bytes())
}

pub fn get(key: u64) -> Option<CachedPlanTemplate> {
    cache().lock().unwrap().get(&key).cloned()
}

pub fn insert(key: u64, template: CachedPlanTemplate) {
    cache().lock().unwrap().insert(key, template);
}

#[cfg(test)]
pub fn clear() {
    cache().lock().unwrap().clear();
}
