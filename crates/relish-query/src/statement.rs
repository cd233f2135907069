//! Explicit query templates with positional parameters.
//!
//! Templates carry `$1..$n` placeholders bound positionally in declaration
//! order. Arity is validated at every bind — extra or missing arguments are a
//! hard error, never silently ignored.

use relish_core::{Passthrough, Value, ValueConverter, WireValue};

use crate::error::QueryError;

/// How result rows are materialized for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowShape {
    /// Column-name → value maps.
    Maps,
    /// Rows are nodes of the given kind, materialized as entities.
    Entities { kind: String },
}

/// A parsed query template.
#[derive(Debug, Clone)]
pub struct Statement {
    text: String,
    arity: usize,
    shape: RowShape,
}

/// A statement with all positional parameters bound, ready for execution.
#[derive(Debug, Clone)]
pub struct BoundStatement {
    /// Query text with positional placeholders rewritten to named `$p{i}`.
    pub text: String,
    /// Named parameters in declaration order.
    pub params: Vec<(String, WireValue)>,
    pub shape: RowShape,
}

impl Statement {
    /// Parse a template, validating that its placeholders form a contiguous
    /// `$1..$n` sequence.
    pub fn parse(text: impl Into<String>) -> Result<Self, QueryError> {
        let text = text.into();
        let indexes = placeholder_indexes(&text);
        let arity = indexes.iter().copied().max().unwrap_or(0);
        for want in 1..=arity {
            if !indexes.contains(&want) {
                return Err(QueryError::NonContiguousPlaceholders { missing: want });
            }
        }
        Ok(Self {
            text,
            arity,
            shape: RowShape::Maps,
        })
    }

    /// Materialize rows as entities of the given kind instead of maps.
    pub fn returning_entities(mut self, kind: impl Into<String>) -> Self {
        self.shape = RowShape::Entities { kind: kind.into() };
        self
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Bind arguments positionally. Mismatched arity is a call-time error.
    ///
    /// Arguments must already be wire-shaped; richer values belong to mapped
    /// fields where a schema converter applies.
    pub fn bind(&self, args: Vec<Value>) -> Result<BoundStatement, QueryError> {
        if args.len() != self.arity {
            return Err(QueryError::Arity {
                expected: self.arity,
                got: args.len(),
            });
        }

        let conv = Passthrough;
        let mut params = Vec::with_capacity(args.len());
        let mut text = self.text.clone();
        for (i, arg) in args.iter().enumerate() {
            let name = format!("p{i}");
            text = replace_placeholder(&text, i + 1, &name);
            params.push((name, conv.to_wire(arg)?));
        }

        Ok(BoundStatement {
            text,
            params,
            shape: self.shape.clone(),
        })
    }
}

/// Collect the distinct `$n` placeholder indexes appearing in a template.
fn placeholder_indexes(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end > start {
                if let Ok(n) = text[start..end].parse::<usize>() {
                    if n > 0 && !found.contains(&n) {
                        found.push(n);
                    }
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }
    found
}

/// Rewrite every `$<index>` occurrence to a named `$<name>` parameter,
/// making sure `$1` does not eat the prefix of `$10`.
fn replace_placeholder(text: &str, index: usize, name: &str) -> String {
    let needle = format!("${index}");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(&needle) {
        let after = rest[pos + needle.len()..].as_bytes().first();
        out.push_str(&rest[..pos]);
        if after.is_some_and(|b| b.is_ascii_digit()) {
            // Longer placeholder; copy verbatim and keep scanning.
            out.push_str(&needle);
        } else {
            out.push('$');
            out.push_str(name);
        }
        rest = &rest[pos + needle.len()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_binds_positionally() {
        let stmt =
            Statement::parse("MATCH (r:Recipe) WHERE r.name = $1 AND r.serves = $2 RETURN r.name")
                .unwrap();
        assert_eq!(stmt.arity(), 2);

        let bound = stmt
            .bind(vec![Value::Text("soup".into()), Value::Int(4)])
            .unwrap();
        assert!(bound.text.contains("$p0"));
        assert!(bound.text.contains("$p1"));
        assert!(!bound.text.contains("$1"));
        assert_eq!(bound.params[0].1, WireValue::Text("soup".into()));
        assert_eq!(bound.params[1].1, WireValue::Int(4));
    }

    #[test]
    fn zero_parameter_template() {
        let stmt = Statement::parse("MATCH (r:Recipe) RETURN count(r) AS total").unwrap();
        assert_eq!(stmt.arity(), 0);
        assert!(stmt.bind(vec![]).is_ok());
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let stmt = Statement::parse("MATCH (r:Recipe) WHERE r.name = $1 RETURN r").unwrap();
        let err = stmt.bind(vec![]).unwrap_err();
        assert!(matches!(err, QueryError::Arity { expected: 1, got: 0 }));

        let err = stmt
            .bind(vec![Value::Int(1), Value::Int(2)])
            .unwrap_err();
        assert!(matches!(err, QueryError::Arity { expected: 1, got: 2 }));
    }

    #[test]
    fn non_contiguous_placeholders_rejected() {
        let err = Statement::parse("MATCH (r) WHERE r.a = $1 AND r.b = $3 RETURN r").unwrap_err();
        assert!(matches!(
            err,
            QueryError::NonContiguousPlaceholders { missing: 2 }
        ));
    }

    #[test]
    fn ten_plus_placeholders_do_not_collide() {
        let text = format!(
            "RETURN {}",
            (1..=10).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ")
        );
        let stmt = Statement::parse(text).unwrap();
        let bound = stmt.bind((0..10).map(Value::Int).collect()).unwrap();
        assert!(bound.text.contains("$p9"));
        assert!(!bound.text.contains("$10"));
    }

    #[test]
    fn entity_shape_is_carried() {
        let stmt = Statement::parse("MATCH (r:Recipe) RETURN r")
            .unwrap()
            .returning_entities("Recipe");
        let bound = stmt.bind(vec![]).unwrap();
        assert_eq!(
            bound.shape,
            RowShape::Entities {
                kind: "Recipe".into()
            }
        );
    }
}
