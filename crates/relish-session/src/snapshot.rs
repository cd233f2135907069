//! Snapshots: the last-known-persisted state of a tracked entity.
//!
//! A snapshot is an immutable, wire-shaped copy of an entity's scalar and
//! relationship state, captured at load and after every successful save, and
//! used solely for diffing. Relationship fields record their load state:
//! `None` means the field was unresolved when captured, and an unresolved
//! field is never diffed — so shallow loads cannot produce spurious deletes.

use std::collections::BTreeMap;

use relish_core::{EntityGraph, EntityId, EntityRef, RelSlot, WireValue};
use relish_schema::Schema;

use crate::error::{Result, SessionError};

/// One persisted relationship as recorded at capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct RelSnapshot {
    pub rel_id: EntityId,
    pub target: EntityId,
    pub props: BTreeMap<String, WireValue>,
}

/// Immutable copy of an entity's persisted state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Wire-shaped scalar properties.
    pub props: BTreeMap<String, WireValue>,
    /// Per relationship field: `None` if unresolved at capture time.
    pub rels: BTreeMap<String, Option<Vec<RelSnapshot>>>,
}

impl Snapshot {
    /// Capture the current state of an arena entity.
    ///
    /// Every link in a resolved slot must already carry its relationship
    /// identity and point at a persisted target; callers capture only after
    /// a completed load or save.
    pub fn capture(schema: &Schema, graph: &EntityGraph, entity: EntityRef) -> Result<Snapshot> {
        let e = graph.get(entity);
        let meta = schema.get(&e.kind).ok_or_else(|| SessionError::UnknownKind {
            kind: e.kind.clone(),
        })?;

        let props = wire_props(schema, e)?;

        let mut rels = BTreeMap::new();
        for (field, slot) in &e.rels {
            let rel_def = meta.relation(field).ok_or_else(|| SessionError::UnknownField {
                kind: e.kind.clone(),
                field: field.clone(),
            })?;
            match slot {
                RelSlot::Unresolved => {
                    rels.insert(field.clone(), None);
                }
                RelSlot::Resolved(links) => {
                    let mut entries = Vec::with_capacity(links.len());
                    for link in links {
                        let rel_id = link.id.ok_or_else(|| {
                            SessionError::Internal(format!(
                                "snapshot of '{}.{field}' saw an unpersisted link",
                                e.kind
                            ))
                        })?;
                        let target = graph.get(link.target).id.ok_or_else(|| {
                            SessionError::Internal(format!(
                                "snapshot of '{}.{field}' saw an unpersisted target",
                                e.kind
                            ))
                        })?;
                        let props = wire_rel_props(schema, rel_def.via.as_deref(), &link.props)?;
                        entries.push(RelSnapshot {
                            rel_id,
                            target,
                            props,
                        });
                    }
                    rels.insert(field.clone(), Some(entries));
                }
            }
        }

        Ok(Snapshot { props, rels })
    }
}

/// Convert an entity's scalar fields to a property-name-keyed wire map.
pub(crate) fn wire_props(
    schema: &Schema,
    e: &relish_core::Entity,
) -> Result<BTreeMap<String, WireValue>> {
    let meta = schema.get(&e.kind).ok_or_else(|| SessionError::UnknownKind {
        kind: e.kind.clone(),
    })?;
    let mut props = BTreeMap::new();
    for (field, value) in &e.props {
        let property = meta
            .property_name(field)
            .ok_or_else(|| SessionError::UnknownField {
                kind: e.kind.clone(),
                field: field.clone(),
            })?;
        props.insert(property.to_string(), meta.to_wire(field, value)?);
    }
    Ok(props)
}

/// Convert relationship-entity properties to wire form, using the via-kind's
/// converters when the edge is declared with one.
pub(crate) fn wire_rel_props(
    schema: &Schema,
    via: Option<&str>,
    props: &BTreeMap<String, relish_core::Value>,
) -> Result<BTreeMap<String, WireValue>> {
    let mut out = BTreeMap::new();
    match via {
        Some(kind) => {
            let meta = schema.get(kind).ok_or_else(|| SessionError::UnknownKind {
                kind: kind.to_string(),
            })?;
            for (field, value) in props {
                let property = meta
                    .property_name(field)
                    .ok_or_else(|| SessionError::UnknownField {
                        kind: kind.to_string(),
                        field: field.clone(),
                    })?;
                out.insert(property.to_string(), meta.to_wire(field, value)?);
            }
        }
        None => {
            let conv = relish_core::Passthrough;
            use relish_core::ValueConverter;
            for (field, value) in props {
                out.insert(field.clone(), conv.to_wire(value)?);
            }
        }
    }
    Ok(out)
}
