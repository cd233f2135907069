//! Change-set calculation: diff the reachable object graph against the
//! session's snapshots to produce a minimal transactional write batch.
//!
//! The walk is breadth-first from the root with an index visited-set, so each
//! entity is considered exactly once and cyclic graphs terminate. Entities
//! without an identity become creates; tracked entities diff field by field.
//! Relationship reconciliation only runs over resolved slots — an unresolved
//! slot was never loaded and can never yield a delete.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use relish_core::{Direction, EntityGraph, EntityId, EntityRef, RelSlot, WireValue};
use relish_graph::{NodeHandle, WriteOp};
use relish_schema::Schema;

use crate::error::{Result, SessionError};
use crate::snapshot::{wire_props, wire_rel_props, Snapshot};

/// Counts of applied operations, summarizing one save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub nodes_created: u32,
    pub nodes_updated: u32,
    pub nodes_deleted: u32,
    pub rels_created: u32,
    pub rels_updated: u32,
    pub rels_deleted: u32,
}

impl SaveReport {
    pub fn total(&self) -> u32 {
        self.nodes_created
            + self.nodes_updated
            + self.nodes_deleted
            + self.rels_created
            + self.rels_updated
            + self.rels_deleted
    }

    pub(crate) fn from_ops(ops: &[WriteOp]) -> Self {
        let mut report = SaveReport::default();
        for op in ops {
            match op {
                WriteOp::CreateNode { .. } => report.nodes_created += 1,
                WriteOp::UpdateNode { .. } => report.nodes_updated += 1,
                WriteOp::DeleteNode { .. } => report.nodes_deleted += 1,
                WriteOp::CreateRel { .. } => report.rels_created += 1,
                WriteOp::UpdateRel { .. } => report.rels_updated += 1,
                WriteOp::DeleteRel { .. } => report.rels_deleted += 1,
            }
        }
        report
    }
}

/// The computed write batch plus the bookkeeping needed to write assigned
/// identities back into the arena after a successful apply.
pub struct ChangeSet {
    pub ops: Vec<WriteOp>,
    /// Entities created by this change set: arena ref → op index.
    pub(crate) created_nodes: Vec<(EntityRef, usize)>,
    /// Links created by this change set: (entity, field, link index) → op index.
    pub(crate) created_rels: Vec<(EntityRef, String, usize, usize)>,
    /// Every entity reachable from the root, in visit order.
    pub(crate) visited: Vec<EntityRef>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Compute the minimal write batch reconciling persisted state with the
/// subgraph reachable from `root`.
pub fn compute(
    schema: &Schema,
    graph: &EntityGraph,
    root: EntityRef,
    snapshots: &HashMap<EntityId, Snapshot>,
) -> Result<ChangeSet> {
    let visited = walk(graph, root);

    let mut ops: Vec<WriteOp> = Vec::new();
    let mut created_nodes = Vec::new();
    let mut handles: HashMap<EntityRef, NodeHandle> = HashMap::new();

    // Node pass first, so relationship ops can reference every endpoint.
    for &r in &visited {
        let e = graph.get(r);
        let meta = schema.get(&e.kind).ok_or_else(|| SessionError::UnknownKind {
            kind: e.kind.clone(),
        })?;
        if !meta.is_node() {
            return Err(SessionError::NotANodeKind {
                kind: e.kind.clone(),
            });
        }

        let current = wire_props(schema, e)?;
        match e.id {
            None => {
                ops.push(WriteOp::CreateNode {
                    label: meta.label().to_string(),
                    props: current,
                });
                let idx = ops.len() - 1;
                handles.insert(r, NodeHandle::Created(idx));
                created_nodes.push((r, idx));
            }
            Some(id) => {
                handles.insert(r, NodeHandle::Existing(id));
                let (set, unset) = match snapshots.get(&id) {
                    Some(snap) => diff_props(&current, &snap.props),
                    // Identity without a snapshot: first contact in this
                    // session, write the full scalar state.
                    None => (current, Vec::new()),
                };
                if !set.is_empty() || !unset.is_empty() {
                    ops.push(WriteOp::UpdateNode { id, set, unset });
                }
            }
        }
    }

    // Relationship pass.
    let mut created_rels = Vec::new();
    let mut deleted_rels: HashSet<EntityId> = HashSet::new();
    // Undirected pairs already created in this batch, to avoid emitting one
    // logical edge twice when both endpoints hold the mirror link.
    let mut undirected_seen: HashMap<(String, EntityRef, EntityRef), usize> = HashMap::new();

    for &r in &visited {
        let e = graph.get(r);
        let meta = schema.get(&e.kind).ok_or_else(|| SessionError::UnknownKind {
            kind: e.kind.clone(),
        })?;

        for (field, slot) in &e.rels {
            let rel_def = meta.relation(field).ok_or_else(|| SessionError::UnknownField {
                kind: e.kind.clone(),
                field: field.clone(),
            })?;
            let RelSlot::Resolved(links) = slot else {
                continue;
            };

            let snap_entries = e
                .id
                .and_then(|id| snapshots.get(&id))
                .and_then(|s| s.rels.get(field))
                .and_then(|o| o.as_deref())
                .unwrap_or(&[]);

            let mut current_ids: HashSet<EntityId> = HashSet::new();
            for (li, link) in links.iter().enumerate() {
                let props = wire_rel_props(schema, rel_def.via.as_deref(), &link.props)?;
                match link.id {
                    Some(rel_id) => {
                        current_ids.insert(rel_id);
                        if let Some(snap) = snap_entries.iter().find(|s| s.rel_id == rel_id) {
                            let (set, unset) = diff_props(&props, &snap.props);
                            if !set.is_empty() || !unset.is_empty() {
                                ops.push(WriteOp::UpdateRel {
                                    id: rel_id,
                                    set,
                                    unset,
                                });
                            }
                        }
                    }
                    None => {
                        if rel_def.direction == Direction::Undirected {
                            let key = undirected_key(&rel_def.rel_type, r, link.target);
                            if let Some(&op_idx) = undirected_seen.get(&key) {
                                // Mirror of an edge already in the batch;
                                // both links adopt the same identity.
                                created_rels.push((r, field.clone(), li, op_idx));
                                continue;
                            }
                        }

                        let (start, end) = match rel_def.direction {
                            Direction::Outgoing | Direction::Undirected => (r, link.target),
                            Direction::Incoming => (link.target, r),
                        };
                        ops.push(WriteOp::CreateRel {
                            rel_type: rel_def.rel_type.clone(),
                            start: handle_of(&handles, start)?,
                            end: handle_of(&handles, end)?,
                            props,
                        });
                        let idx = ops.len() - 1;
                        created_rels.push((r, field.clone(), li, idx));
                        if rel_def.direction == Direction::Undirected {
                            undirected_seen
                                .insert(undirected_key(&rel_def.rel_type, r, link.target), idx);
                        }
                    }
                }
            }

            // A previously recorded reference now absent from the resolved
            // slot means the caller dropped it: delete the relationship,
            // never its endpoints.
            for snap in snap_entries {
                if !current_ids.contains(&snap.rel_id) && deleted_rels.insert(snap.rel_id) {
                    ops.push(WriteOp::DeleteRel { id: snap.rel_id });
                }
            }
        }
    }

    Ok(ChangeSet {
        ops,
        created_nodes,
        created_rels,
        visited,
    })
}

/// Breadth-first visit order over resolved links, cycle-safe.
fn walk(graph: &EntityGraph, root: EntityRef) -> Vec<EntityRef> {
    let mut order = Vec::new();
    let mut seen: HashSet<EntityRef> = HashSet::new();
    let mut queue = VecDeque::from([root]);

    while let Some(r) = queue.pop_front() {
        if !seen.insert(r) {
            continue;
        }
        order.push(r);
        for slot in graph.get(r).rels.values() {
            for link in slot.links() {
                if !seen.contains(&link.target) {
                    queue.push_back(link.target);
                }
            }
        }
    }
    order
}

fn handle_of(handles: &HashMap<EntityRef, NodeHandle>, r: EntityRef) -> Result<NodeHandle> {
    handles
        .get(&r)
        .copied()
        .ok_or_else(|| SessionError::Internal(format!("no handle for arena entity {}", r.0)))
}

fn undirected_key(
    rel_type: &str,
    a: EntityRef,
    b: EntityRef,
) -> (String, EntityRef, EntityRef) {
    if a.0 <= b.0 {
        (rel_type.to_string(), a, b)
    } else {
        (rel_type.to_string(), b, a)
    }
}

/// Minimal set/unset maps turning `previous` into `current`.
fn diff_props(
    current: &BTreeMap<String, WireValue>,
    previous: &BTreeMap<String, WireValue>,
) -> (BTreeMap<String, WireValue>, Vec<String>) {
    let mut set = BTreeMap::new();
    for (k, v) in current {
        if previous.get(k) != Some(v) {
            set.insert(k.clone(), v.clone());
        }
    }
    let unset = previous
        .keys()
        .filter(|k| !current.contains_key(*k))
        .cloned()
        .collect();
    (set, unset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relish_core::{Entity, RelLink};
    use relish_schema::EntityDef;

    fn schema() -> Schema {
        Schema::builder()
            .entity(
                EntityDef::node("Ingredient", "Ingredient")
                    .identity("id")
                    .prop("name")
                    .relation_via(
                        "pairings",
                        "PAIRS_WITH",
                        Direction::Undirected,
                        "Ingredient",
                        "Pairing",
                    ),
            )
            .entity(
                EntityDef::relationship("Pairing", "PAIRS_WITH")
                    .identity("id")
                    .endpoints("Ingredient", "Ingredient")
                    .prop("affinity"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn new_cyclic_pair_creates_each_once() {
        let s = schema();
        let mut graph = EntityGraph::new();
        let a = graph.add(Entity::new("Ingredient").with_prop("name", "sage"));
        let b = graph.add(Entity::new("Ingredient").with_prop("name", "apple"));
        graph
            .get_mut(a)
            .push_link("pairings", RelLink::to(b).with_prop("affinity", 0.9));
        graph
            .get_mut(b)
            .push_link("pairings", RelLink::to(a).with_prop("affinity", 0.9));

        let cs = compute(&s, &graph, a, &HashMap::new()).unwrap();

        assert_eq!(cs.visited.len(), 2);
        let creates_nodes = cs
            .ops
            .iter()
            .filter(|op| matches!(op, WriteOp::CreateNode { .. }))
            .count();
        let creates_rels = cs
            .ops
            .iter()
            .filter(|op| matches!(op, WriteOp::CreateRel { .. }))
            .count();
        assert_eq!(creates_nodes, 2);
        // One logical undirected edge, not two.
        assert_eq!(creates_rels, 1);
        // Both mirror links map to the same create op.
        assert_eq!(cs.created_rels.len(), 2);
        assert_eq!(cs.created_rels[0].3, cs.created_rels[1].3);
    }

    #[test]
    fn unchanged_tracked_entity_yields_empty_set() {
        let s = schema();
        let mut graph = EntityGraph::new();
        let a = graph.add(Entity::new("Ingredient").with_prop("name", "sage"));
        graph.get_mut(a).id = Some(EntityId(7));
        graph.get_mut(a).resolve("pairings", vec![]);

        let mut snapshots = HashMap::new();
        snapshots.insert(
            EntityId(7),
            Snapshot::capture(&s, &graph, a).unwrap(),
        );

        let cs = compute(&s, &graph, a, &snapshots).unwrap();
        assert!(cs.is_empty());
    }

    #[test]
    fn property_change_produces_minimal_update() {
        let s = schema();
        let mut graph = EntityGraph::new();
        let a = graph.add(Entity::new("Ingredient").with_prop("name", "sage"));
        graph.get_mut(a).id = Some(EntityId(7));

        let mut snapshots = HashMap::new();
        snapshots.insert(EntityId(7), Snapshot::capture(&s, &graph, a).unwrap());

        graph.get_mut(a).set_prop("name", "clary sage");
        let cs = compute(&s, &graph, a, &snapshots).unwrap();

        assert_eq!(cs.ops.len(), 1);
        match &cs.ops[0] {
            WriteOp::UpdateNode { id, set, unset } => {
                assert_eq!(*id, EntityId(7));
                assert_eq!(set.len(), 1);
                assert_eq!(set.get("name"), Some(&WireValue::Text("clary sage".into())));
                assert!(unset.is_empty());
            }
            other => panic!("expected UpdateNode, got {other:?}"),
        }
    }

    #[test]
    fn dropped_link_deletes_relationship_only() {
        let s = schema();
        let mut graph = EntityGraph::new();
        let a = graph.add(Entity::new("Ingredient").with_prop("name", "sage"));
        let b = graph.add(Entity::new("Ingredient").with_prop("name", "apple"));
        graph.get_mut(a).id = Some(EntityId(1));
        graph.get_mut(b).id = Some(EntityId(2));
        let mut link = RelLink::to(b);
        link.id = Some(EntityId(100));
        graph.get_mut(a).resolve("pairings", vec![link]);
        graph.get_mut(b).resolve("pairings", vec![]);

        let mut snapshots = HashMap::new();
        snapshots.insert(EntityId(1), Snapshot::capture(&s, &graph, a).unwrap());
        snapshots.insert(EntityId(2), Snapshot::capture(&s, &graph, b).unwrap());

        graph.get_mut(a).remove_links_to("pairings", b);
        let cs = compute(&s, &graph, a, &snapshots).unwrap();

        assert_eq!(cs.ops, vec![WriteOp::DeleteRel { id: EntityId(100) }]);
    }

    #[test]
    fn unresolved_slot_never_deletes() {
        let s = schema();
        let mut graph = EntityGraph::new();
        let a = graph.add(Entity::new("Ingredient").with_prop("name", "sage"));
        graph.get_mut(a).id = Some(EntityId(1));

        // Snapshot recorded a persisted pairing when the slot was loaded.
        let mut snap = Snapshot::capture(&s, &graph, a).unwrap();
        snap.rels.insert(
            "pairings".into(),
            Some(vec![crate::snapshot::RelSnapshot {
                rel_id: EntityId(100),
                target: EntityId(2),
                props: BTreeMap::new(),
            }]),
        );
        let mut snapshots = HashMap::new();
        snapshots.insert(EntityId(1), snap);

        // A later shallow load left the slot unresolved; the absent link
        // must not be mistaken for a removal.
        graph
            .get_mut(a)
            .rels
            .insert("pairings".into(), RelSlot::Unresolved);
        let cs = compute(&s, &graph, a, &snapshots).unwrap();
        assert!(cs.is_empty());
    }
}
