//! Finder-name derivation.
//!
//! A finder name encodes a conjunctive predicate over one node kind:
//! `by_name`, `by_name_and_serves`, `by_name_and_category_name`. Tokens are
//! split on the `_and_` conjunction (AND semantics only) and each token must
//! resolve to either a declared scalar field or a one-hop nested path
//! `<relation field>_<target scalar field>`. Unrecognized tokens fail at
//! derivation time, before any database work.

use relish_core::{Direction, Value, WireValue};
use relish_schema::{EntityMeta, Schema};

use crate::error::QueryError;

/// One hop through a declared relationship field.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub rel_type: String,
    pub direction: Direction,
    pub target_label: String,
}

/// A derived property path: optional hop, then a persisted property.
#[derive(Debug, Clone)]
struct PathSpec {
    hop: Option<Hop>,
    /// Declared field name, for converter lookup.
    field: String,
    /// Persisted property name.
    property: String,
    /// Kind whose converter applies to the bound value.
    owner_kind: String,
}

/// A validated finder, reusable across calls with different arguments.
#[derive(Debug, Clone)]
pub struct Finder {
    pub kind: String,
    pub label: String,
    name: String,
    paths: Vec<PathSpec>,
}

/// A bound predicate ready for backend execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub hop: Option<Hop>,
    pub property: String,
    pub value: WireValue,
}

/// A finder with all parameters bound, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundFinder {
    pub label: String,
    pub predicates: Vec<Predicate>,
}

impl Finder {
    /// Derive a finder from its name against the registry.
    pub fn derive(schema: &Schema, kind: &str, name: &str) -> Result<Self, QueryError> {
        let meta = schema.get(kind).ok_or_else(|| QueryError::UnknownKind {
            kind: kind.to_string(),
        })?;
        if !meta.is_node() {
            return Err(QueryError::NotANodeKind {
                kind: kind.to_string(),
            });
        }

        let stripped = name.strip_prefix("find_").unwrap_or(name);
        let body = stripped
            .strip_prefix("by_")
            .ok_or_else(|| QueryError::BadFinderName {
                finder: name.to_string(),
            })?;

        let mut paths = Vec::new();
        for token in body.split("_and_") {
            paths.push(resolve_token(schema, meta, name, token)?);
        }

        tracing::debug!(kind, finder = name, arity = paths.len(), "Derived finder");
        Ok(Self {
            kind: kind.to_string(),
            label: meta.label().to_string(),
            name: name.to_string(),
            paths,
        })
    }

    /// Number of parameters this finder expects.
    pub fn arity(&self) -> usize {
        self.paths.len()
    }

    /// Bind arguments positionally, converting each through the owning
    /// field's converter. Mismatched arity fails at call time.
    pub fn bind(&self, schema: &Schema, args: Vec<Value>) -> Result<BoundFinder, QueryError> {
        if args.len() != self.paths.len() {
            return Err(QueryError::Arity {
                expected: self.paths.len(),
                got: args.len(),
            });
        }

        let mut predicates = Vec::with_capacity(args.len());
        for (path, arg) in self.paths.iter().zip(args) {
            let owner = schema
                .get(&path.owner_kind)
                .ok_or_else(|| QueryError::UnknownKind {
                    kind: path.owner_kind.clone(),
                })?;
            let value = owner.to_wire(&path.field, &arg)?;
            predicates.push(Predicate {
                hop: path.hop.clone(),
                property: path.property.clone(),
                value,
            });
        }

        Ok(BoundFinder {
            label: self.label.clone(),
            predicates,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Resolve one finder token to a property path.
///
/// Scalar fields win over nested interpretations; for nested tokens the
/// relation-field prefix is matched greedily (longest declared field first)
/// so `category_name` resolves even when `category` itself is ambiguous.
fn resolve_token(
    schema: &Schema,
    meta: &EntityMeta,
    finder: &str,
    token: &str,
) -> Result<PathSpec, QueryError> {
    if let Some(property) = meta.property_name(token) {
        return Ok(PathSpec {
            hop: None,
            field: token.to_string(),
            property: property.to_string(),
            owner_kind: meta.kind.clone(),
        });
    }

    let mut candidates: Vec<_> = meta
        .relations()
        .filter(|r| token.starts_with(&format!("{}_", r.field)))
        .collect();
    candidates.sort_by_key(|r| std::cmp::Reverse(r.field.len()));

    for rel in candidates {
        let rest = &token[rel.field.len() + 1..];
        let Some(target) = schema.get(&rel.target_kind) else {
            continue;
        };
        if let Some(property) = target.property_name(rest) {
            return Ok(PathSpec {
                hop: Some(Hop {
                    rel_type: rel.rel_type.clone(),
                    direction: rel.direction,
                    target_label: target.label().to_string(),
                }),
                field: rest.to_string(),
                property: property.to_string(),
                owner_kind: target.kind.clone(),
            });
        }
    }

    Err(QueryError::UnsupportedToken {
        kind: meta.kind.clone(),
        finder: finder.to_string(),
        token: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relish_schema::EntityDef;

    fn schema() -> Schema {
        Schema::builder()
            .entity(
                EntityDef::node("Recipe", "Recipe")
                    .identity("id")
                    .prop("name")
                    .prop("serves")
                    .relation("category", "IN_CATEGORY", Direction::Outgoing, "Category"),
            )
            .entity(
                EntityDef::node("Category", "Category")
                    .identity("id")
                    .prop("name"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn derives_single_scalar_token() {
        let s = schema();
        let finder = Finder::derive(&s, "Recipe", "by_name").unwrap();
        assert_eq!(finder.arity(), 1);

        let bound = finder.bind(&s, vec![Value::Text("soup".into())]).unwrap();
        assert_eq!(bound.predicates[0].property, "name");
        assert_eq!(bound.predicates[0].hop, None);
    }

    #[test]
    fn derives_conjunction_with_nested_path() {
        let s = schema();
        let finder = Finder::derive(&s, "Recipe", "by_name_and_category_name").unwrap();
        assert_eq!(finder.arity(), 2);

        let bound = finder
            .bind(&s, vec![Value::Text("soup".into()), Value::Text("starters".into())])
            .unwrap();
        assert_eq!(bound.predicates[0].hop, None);
        let hop = bound.predicates[1].hop.as_ref().unwrap();
        assert_eq!(hop.rel_type, "IN_CATEGORY");
        assert_eq!(hop.target_label, "Category");
        assert_eq!(bound.predicates[1].property, "name");
    }

    #[test]
    fn accepts_find_prefix() {
        let s = schema();
        assert!(Finder::derive(&s, "Recipe", "find_by_serves").is_ok());
    }

    #[test]
    fn unrecognized_token_fails_derivation() {
        let s = schema();
        let err = Finder::derive(&s, "Recipe", "by_flavour").unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedToken { .. }));
    }

    #[test]
    fn missing_by_prefix_rejected() {
        let s = schema();
        let err = Finder::derive(&s, "Recipe", "with_name").unwrap_err();
        assert!(matches!(err, QueryError::BadFinderName { .. }));
    }

    #[test]
    fn arity_mismatch_at_bind_time() {
        let s = schema();
        let finder = Finder::derive(&s, "Recipe", "by_name_and_serves").unwrap();
        let err = finder.bind(&s, vec![Value::Text("soup".into())]).unwrap_err();
        assert!(matches!(err, QueryError::Arity { expected: 2, got: 1 }));
    }
}
