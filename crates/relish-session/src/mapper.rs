//! Object graph mapping: hydrate arena entity graphs from backend records.
//!
//! Loading is a breadth-first frontier expansion. Root records become arena
//! entities with every declared relationship field unresolved; each hop
//! resolves the frontier's fields, materializes newly-seen neighbor nodes,
//! and makes them the next frontier. The depth bound counts hops from the
//! roots, so depth 0 loads scalars only.

use std::collections::{BTreeMap, HashMap};

use relish_core::{
    Depth, Direction, Entity, EntityGraph, EntityId, EntityRef, Passthrough, RelLink, RelSlot,
    Value, ValueConverter, WireValue,
};
use relish_graph::{GraphBackend, NeighborRecord, NodeRecord};
use relish_schema::{RelationDef, Schema};
use tracing::debug;

use crate::error::{Result, SessionError};

/// Hydrate the records in `roots` (all of kind `kind`) into a fresh arena,
/// expanding relationships out to `depth` hops.
///
/// Returns the arena together with the root refs, positionally matching
/// `roots`. Nodes reached through more than one path are materialized once
/// and shared, so cycles hydrate without duplication.
pub async fn hydrate(
    schema: &Schema,
    backend: &dyn GraphBackend,
    kind: &str,
    roots: Vec<NodeRecord>,
    depth: Depth,
) -> Result<(EntityGraph, Vec<EntityRef>)> {
    let mut graph = EntityGraph::new();
    let mut by_id: HashMap<EntityId, EntityRef> = HashMap::new();

    let mut root_refs = Vec::with_capacity(roots.len());
    for record in roots {
        let r = materialize(schema, &mut graph, &mut by_id, kind, &record)?;
        root_refs.push(r);
    }

    let mut frontier: Vec<EntityRef> = root_refs.clone();
    let mut hop = 0u32;
    while !frontier.is_empty() && depth.allows(hop) {
        frontier = expand(schema, backend, &mut graph, &mut by_id, &frontier).await?;
        hop += 1;
    }

    debug!(entities = graph.len(), hops = hop, "hydrated entity graph");
    Ok((graph, root_refs))
}

/// Resolve every relationship field of the frontier entities and return the
/// refs materialized for the first time during this hop.
async fn expand(
    schema: &Schema,
    backend: &dyn GraphBackend,
    graph: &mut EntityGraph,
    by_id: &mut HashMap<EntityId, EntityRef>,
    frontier: &[EntityRef],
) -> Result<Vec<EntityRef>> {
    // Every frontier entity gets all of its fields resolved (possibly to
    // empty) before any links are attached.
    let mut ids = Vec::with_capacity(frontier.len());
    for &r in frontier {
        let e = graph.get(r);
        let id = e.id.ok_or_else(|| {
            SessionError::Internal(format!("frontier entity of kind '{}' has no identity", e.kind))
        })?;
        ids.push(id);
        let fields: Vec<String> = schema
            .get(&e.kind)
            .map(|m| m.relations().map(|rel| rel.field.clone()).collect())
            .unwrap_or_default();
        let e = graph.get_mut(r);
        for field in fields {
            e.resolve(field, Vec::new());
        }
    }

    let mut next = Vec::new();
    for record in backend.neighbors(&ids).await? {
        let Some(&owner) = by_id.get(&record.of) else {
            continue;
        };
        let owner_kind = graph.get(owner).kind.clone();
        let meta = schema
            .get(&owner_kind)
            .ok_or_else(|| SessionError::UnknownKind { kind: owner_kind })?;

        let Some(rel_def) = match_relation(schema, meta.relations(), &record) else {
            // A relationship the schema does not declare on this kind; the
            // database may hold edges the model never maps.
            continue;
        };
        let rel_def = rel_def.clone();

        let target = match by_id.get(&record.node.id) {
            Some(&t) => t,
            None => {
                let t = materialize(schema, graph, by_id, &rel_def.target_kind, &record.node)?;
                next.push(t);
                t
            }
        };

        let props = value_rel_props(schema, rel_def.via.as_deref(), &record.rel.props)?;
        let mut link = RelLink::to(target);
        link.id = Some(record.rel.id);
        link.props = props;
        graph.get_mut(owner).push_link(&rel_def.field, link);
    }

    Ok(next)
}

/// Decide which declared relation of the owner a neighbor record belongs to:
/// the relationship type, traversal direction, and far-end label must all
/// agree with the declaration.
fn match_relation<'a>(
    schema: &Schema,
    mut relations: impl Iterator<Item = &'a RelationDef>,
    record: &NeighborRecord,
) -> Option<&'a RelationDef> {
    relations.find(|rel| {
        if rel.rel_type != record.rel.rel_type {
            return false;
        }
        let direction_ok = match rel.direction {
            Direction::Outgoing => record.rel.start == record.of,
            Direction::Incoming => record.rel.end == record.of,
            Direction::Undirected => true,
        };
        if !direction_ok {
            return false;
        }
        schema
            .get(&rel.target_kind)
            .is_some_and(|m| m.label() == record.node.label)
    })
}

/// Turn one backend node record into an arena entity of `kind`, mapping wire
/// properties back through the kind's declared fields and converters.
fn materialize(
    schema: &Schema,
    graph: &mut EntityGraph,
    by_id: &mut HashMap<EntityId, EntityRef>,
    kind: &str,
    record: &NodeRecord,
) -> Result<EntityRef> {
    let meta = schema.get(kind).ok_or_else(|| SessionError::UnknownKind {
        kind: kind.to_string(),
    })?;

    let mut entity = Entity::new(kind);
    entity.id = Some(record.id);
    for (property, wire) in &record.props {
        // Properties the model does not declare are ignored, not errors.
        if let Some(field) = meta.field_for_property(property) {
            let value = meta.from_wire(field, wire)?;
            entity.props.insert(field.to_string(), value);
        }
    }
    // Every declared relationship field starts beyond the horizon.
    for rel in meta.relations() {
        entity.rels.insert(rel.field.clone(), RelSlot::Unresolved);
    }

    let r = graph.add(entity);
    by_id.insert(record.id, r);
    Ok(r)
}

/// Convert wire relationship properties back to rich values, using the
/// via-kind's converters when the edge declares one.
pub(crate) fn value_rel_props(
    schema: &Schema,
    via: Option<&str>,
    props: &BTreeMap<String, WireValue>,
) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    match via {
        Some(kind) => {
            let meta = schema.get(kind).ok_or_else(|| SessionError::UnknownKind {
                kind: kind.to_string(),
            })?;
            for (property, wire) in props {
                if let Some(field) = meta.field_for_property(property) {
                    out.insert(field.to_string(), meta.from_wire(field, wire)?);
                }
            }
        }
        None => {
            for (property, wire) in props {
                out.insert(property.clone(), Passthrough.from_wire(wire)?);
            }
        }
    }
    Ok(out)
}
