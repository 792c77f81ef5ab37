//! Typed payload representation.
//!
//! A row's non-temporal columns are a small closed `Value` enum rather than
//! untyped JSON, so payloads hash and compare deterministically. `Value::Delete`
//! is the sentinel `DELETE_FOR_PORTION_OF` uses to mark "strip this column".

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Days since the epoch, for `date` columns.
    Date(i32),
    /// Microseconds since the epoch, for `timestamp`/`timestamptz` columns.
    Timestamp(i64),
    Uuid(u128),
    /// Sentinel requesting that the column be cleared (DELETE_FOR_PORTION_OF payload).
    Delete,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Value::Delete)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "date:{d}"),
            Value::Timestamp(t) => write!(f, "ts:{t}"),
            Value::Uuid(u) => write!(f, "{u:032x}"),
            Value::Delete => write!(f, "DELETE"),
        }
    }
}

/// Serializes the same way the value prints, so a `log_trace` dump reads the
/// way the rest of the crate's diagnostics do (no separate JSON schema to
/// keep in sync with `Display`).
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Date(_) | Value::Timestamp(_) | Value::Uuid(_) | Value::Delete => {
                serializer.serialize_str(&self.to_string())
            }
        }
    }
}

/// A row's non-temporal data, keyed by column name. `BTreeMap` so a payload
/// hashes and prints deterministically regardless of insertion order.
pub type Payload = BTreeMap<String, Value>;

/// Drop NULL-valued keys: a NULL in an UPSERT/REPLACE payload means "no
/// opinion", not "set to NULL".
pub fn strip_nulls(payload: &Payload) -> Payload {
    payload
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Two payloads are equal for coalescing/diff purposes if they agree on every
/// key once NULLs are stripped from both sides.
pub fn payloads_equal_ignoring_nulls(a: &Payload, b: &Payload) -> bool {
    strip_nulls(a) == strip_nulls(b)
}

/// xxh3-64 of a payload's stripped, canonically-ordered (key, value) pairs.
/// Used by the island coalescer to decide whether two adjacent atomic
/// segments carry identical data without repeatedly doing a full map compare.
pub fn data_hash(payload: &Payload) -> u64 {
    let stripped = strip_nulls(payload);
    let mut buf = String::new();
    for (k, v) in &stripped {
        buf.push_str(k);
        buf.push('\0');
        buf.push_str(&v.to_string());
        buf.push('\0');
    }
    xxhash_rust::xxh3::xxh3_64(buf.as_bytes())
}
