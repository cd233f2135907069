//! Property value models.
//!
//! Two layers: `Value` is what entities hold in memory and may carry richer
//! types (timestamps); `WireValue` is what the database accepts — numeric,
//! boolean, text, and homogeneous lists of these. Converters in
//! [`crate::convert`] bridge the two per field.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── In-Memory Values ──────────────────────────────────────────────

/// An in-memory property value as held by an [`crate::Entity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
}

impl Value {
    /// Short tag for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

// ── Wire Values ───────────────────────────────────────────────────

/// A database-representable property value.
///
/// The wire encoding is restricted to numeric, boolean, text, and homogeneous
/// lists of these. Richer values never cross this boundary unconverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    List(Vec<WireValue>),
}

impl WireValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            WireValue::Int(_) => "int",
            WireValue::Float(_) => "float",
            WireValue::Bool(_) => "bool",
            WireValue::Text(_) => "text",
            WireValue::List(_) => "list",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            WireValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether a list is homogeneous and contains no nested lists.
    pub fn is_homogeneous(items: &[WireValue]) -> bool {
        let mut kinds = items.iter().map(WireValue::kind_name);
        match kinds.next() {
            None => true,
            Some("list") => false,
            Some(first) => kinds.all(|k| k == first),
        }
    }

    /// Total ordering used for query-level sorting.
    ///
    /// Values of the same kind compare naturally; mixed kinds fall back to a
    /// fixed kind rank so sorting stays stable rather than panicking.
    pub fn sort_cmp(&self, other: &WireValue) -> Ordering {
        use WireValue::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (a, b) => kind_rank(a).cmp(&kind_rank(b)),
        }
    }
}

fn kind_rank(v: &WireValue) -> u8 {
    match v {
        WireValue::Bool(_) => 0,
        WireValue::Int(_) => 1,
        WireValue::Float(_) => 1,
        WireValue::Text(_) => 2,
        WireValue::List(_) => 3,
    }
}

impl From<i64> for WireValue {
    fn from(v: i64) -> Self {
        WireValue::Int(v)
    }
}

impl From<f64> for WireValue {
    fn from(v: f64) -> Self {
        WireValue::Float(v)
    }
}

impl From<bool> for WireValue {
    fn from(v: bool) -> Self {
        WireValue::Bool(v)
    }
}

impl From<&str> for WireValue {
    fn from(v: &str) -> Self {
        WireValue::Text(v.to_string())
    }
}

impl From<String> for WireValue {
    fn from(v: String) -> Self {
        WireValue::Text(v)
    }
}
