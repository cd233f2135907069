//! Property converters.
//!
//! The wire format only carries numeric, boolean, text, and homogeneous list
//! values. Any richer in-memory value must be converted to and from one of
//! these by a converter registered per field in the schema. Conversions must
//! round-trip without loss for every value the field can legally hold.

use chrono::{DateTime, Utc};

use crate::value::{Value, WireValue};

/// Errors raised by property conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Value of kind '{kind}' is not wire-representable without a converter")]
    NotWireSafe { kind: &'static str },

    #[error("Converter expected a {expected} value, got {got}")]
    UnexpectedKind {
        expected: &'static str,
        got: &'static str,
    },

    #[error("List is heterogeneous or nested; wire lists must be flat and homogeneous")]
    BadList,

    #[error("Failed to parse persisted value: {0}")]
    Parse(String),
}

/// Bidirectional converter between an in-memory value and its wire form.
pub trait ValueConverter: Send + Sync {
    fn to_wire(&self, value: &Value) -> Result<WireValue, ConvertError>;
    fn from_wire(&self, value: &WireValue) -> Result<Value, ConvertError>;
}

// ── Pass-Through ──────────────────────────────────────────────────

/// Default converter for fields whose values are already wire-shaped.
///
/// Rejects `Value::DateTime` (register [`DateTimeText`] for those fields) and
/// heterogeneous or nested lists.
pub struct Passthrough;

impl ValueConverter for Passthrough {
    fn to_wire(&self, value: &Value) -> Result<WireValue, ConvertError> {
        match value {
            Value::Int(i) => Ok(WireValue::Int(*i)),
            Value::Float(f) => Ok(WireValue::Float(*f)),
            Value::Bool(b) => Ok(WireValue::Bool(*b)),
            Value::Text(s) => Ok(WireValue::Text(s.clone())),
            Value::DateTime(_) => Err(ConvertError::NotWireSafe {
                kind: value.kind_name(),
            }),
            Value::List(items) => {
                let wire = items
                    .iter()
                    .map(|v| self.to_wire(v))
                    .collect::<Result<Vec<_>, _>>()?;
                if !WireValue::is_homogeneous(&wire) {
                    return Err(ConvertError::BadList);
                }
                Ok(WireValue::List(wire))
            }
        }
    }

    fn from_wire(&self, value: &WireValue) -> Result<Value, ConvertError> {
        match value {
            WireValue::Int(i) => Ok(Value::Int(*i)),
            WireValue::Float(f) => Ok(Value::Float(*f)),
            WireValue::Bool(b) => Ok(Value::Bool(*b)),
            WireValue::Text(s) => Ok(Value::Text(s.clone())),
            WireValue::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|v| self.from_wire(v))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
        }
    }
}

// ── Timestamps ────────────────────────────────────────────────────

/// Converts `Value::DateTime` to RFC 3339 text on the wire.
///
/// RFC 3339 with a fixed UTC offset sorts lexicographically in timestamp
/// order, so date-sorted queries work against the text encoding.
pub struct DateTimeText;

impl ValueConverter for DateTimeText {
    fn to_wire(&self, value: &Value) -> Result<WireValue, ConvertError> {
        match value {
            Value::DateTime(dt) => Ok(WireValue::Text(
                dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            )),
            other => Err(ConvertError::UnexpectedKind {
                expected: "datetime",
                got: other.kind_name(),
            }),
        }
    }

    fn from_wire(&self, value: &WireValue) -> Result<Value, ConvertError> {
        match value {
            WireValue::Text(s) => {
                let dt = DateTime::parse_from_rfc3339(s)
                    .map_err(|e| ConvertError::Parse(format!("invalid RFC 3339 '{s}': {e}")))?;
                Ok(Value::DateTime(dt.with_timezone(&Utc)))
            }
            other => Err(ConvertError::UnexpectedKind {
                expected: "text",
                got: other.kind_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_round_trip() {
        let conv = Passthrough;
        for v in [
            Value::Int(7),
            Value::Float(1.25),
            Value::Bool(true),
            Value::Text("sage".into()),
            Value::List(vec![Value::Text("a".into()), Value::Text("b".into())]),
        ] {
            let wire = conv.to_wire(&v).unwrap();
            assert_eq!(conv.from_wire(&wire).unwrap(), v);
        }
    }

    #[test]
    fn passthrough_rejects_datetime() {
        let conv = Passthrough;
        let err = conv.to_wire(&Value::DateTime(Utc::now())).unwrap_err();
        assert!(matches!(err, ConvertError::NotWireSafe { .. }));
    }

    #[test]
    fn passthrough_rejects_mixed_list() {
        let conv = Passthrough;
        let v = Value::List(vec![Value::Int(1), Value::Text("x".into())]);
        assert!(matches!(conv.to_wire(&v), Err(ConvertError::BadList)));
    }

    #[test]
    fn datetime_round_trip() {
        let conv = DateTimeText;
        let now = Value::DateTime(Utc::now());
        let wire = conv.to_wire(&now).unwrap();
        let back = conv.from_wire(&wire).unwrap();
        // Lossless at microsecond precision.
        match (&now, &back) {
            (Value::DateTime(a), Value::DateTime(b)) => {
                assert_eq!(a.timestamp_micros(), b.timestamp_micros());
            }
            _ => panic!("expected datetimes"),
        }
    }

    #[test]
    fn datetime_wire_sorts_chronologically() {
        let conv = DateTimeText;
        let earlier = Value::DateTime("2024-01-01T00:00:00Z".parse().unwrap());
        let later = Value::DateTime("2024-06-01T00:00:00Z".parse().unwrap());
        let a = conv.to_wire(&earlier).unwrap();
        let b = conv.to_wire(&later).unwrap();
        assert_eq!(a.sort_cmp(&b), std::cmp::Ordering::Less);
    }
}
