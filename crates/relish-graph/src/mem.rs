//! Embedded in-memory backend.
//!
//! Backs hermetic tests and local development with the same contract as the
//! Neo4j backend: transactional batches (all-or-nothing), database-assigned
//! identities, query-level sort and pagination, and optional unique-property
//! constraints to exercise failure paths. Explicit Cypher execution is the
//! one unsupported operation — this store does not interpret query text.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use relish_core::{Direction, EntityId, Page, SortDirection, SortOrder, WireValue};
use relish_query::{BoundFinder, BoundStatement, Predicate};

use crate::backend::{
    GraphBackend, GraphError, NeighborRecord, NodeHandle, NodeRecord, RelRecord, Row, WriteOp,
};

#[derive(Debug, Clone)]
struct StoredNode {
    label: String,
    props: BTreeMap<String, WireValue>,
}

#[derive(Debug, Clone)]
struct StoredRel {
    rel_type: String,
    start: i64,
    end: i64,
    props: BTreeMap<String, WireValue>,
}

#[derive(Debug, Clone, Default)]
struct MemStore {
    next_id: i64,
    nodes: BTreeMap<i64, StoredNode>,
    rels: BTreeMap<i64, StoredRel>,
}

impl MemStore {
    fn assign_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// In-memory [`GraphBackend`].
pub struct MemBackend {
    store: Mutex<MemStore>,
    constraints: Vec<(String, String)>,
    apply_calls: AtomicU64,
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemBackend {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(MemStore::default()),
            constraints: Vec::new(),
            apply_calls: AtomicU64::new(0),
        }
    }

    /// Enforce uniqueness of a property among nodes of a label.
    pub fn with_unique(mut self, label: impl Into<String>, property: impl Into<String>) -> Self {
        self.constraints.push((label.into(), property.into()));
        self
    }

    /// How many write batches have been applied. Lets tests assert that an
    /// unchanged save issued zero writes.
    pub fn apply_count(&self) -> u64 {
        self.apply_calls.load(AtomicOrdering::SeqCst)
    }

    /// Node count across all labels (test helper).
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Relationship count (test helper).
    pub fn rel_count(&self) -> usize {
        self.lock().rels.len()
    }

    /// Writes land atomically (copy-on-write in `apply`), so a panicked
    /// holder cannot leave a half-applied batch behind; recover the guard
    /// instead of propagating the poison.
    fn lock(&self) -> MutexGuard<'_, MemStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_constraints(&self, store: &MemStore) -> Result<(), GraphError> {
        for (label, property) in &self.constraints {
            let mut seen: Vec<&WireValue> = Vec::new();
            for node in store.nodes.values().filter(|n| &n.label == label) {
                if let Some(v) = node.props.get(property) {
                    if seen.contains(&v) {
                        return Err(GraphError::ConstraintViolation {
                            label: label.clone(),
                            property: property.clone(),
                        });
                    }
                    seen.push(v);
                }
            }
        }
        Ok(())
    }
}

fn resolve_handle(
    handle: NodeHandle,
    assigned: &[Option<EntityId>],
) -> Result<i64, GraphError> {
    match handle {
        NodeHandle::Existing(id) => Ok(id.0),
        NodeHandle::Created(op_index) => assigned
            .get(op_index)
            .copied()
            .flatten()
            .map(|id| id.0)
            .ok_or_else(|| {
                GraphError::BadBatch(format!(
                    "relationship references op {op_index}, which assigned no identity"
                ))
            }),
    }
}

fn node_record(id: i64, node: &StoredNode) -> NodeRecord {
    NodeRecord {
        id: EntityId(id),
        label: node.label.clone(),
        props: node.props.clone(),
    }
}

fn rel_record(id: i64, rel: &StoredRel) -> RelRecord {
    RelRecord {
        id: EntityId(id),
        rel_type: rel.rel_type.clone(),
        start: EntityId(rel.start),
        end: EntityId(rel.end),
        props: rel.props.clone(),
    }
}

/// Whether `node_id` satisfies one bound predicate within the store.
fn matches_predicate(store: &MemStore, node_id: i64, pred: &Predicate) -> bool {
    match &pred.hop {
        None => store
            .nodes
            .get(&node_id)
            .and_then(|n| n.props.get(&pred.property))
            == Some(&pred.value),
        Some(hop) => store.rels.values().any(|rel| {
            if rel.rel_type != hop.rel_type {
                return false;
            }
            let other = match hop.direction {
                Direction::Outgoing if rel.start == node_id => rel.end,
                Direction::Incoming if rel.end == node_id => rel.start,
                Direction::Undirected if rel.start == node_id => rel.end,
                Direction::Undirected if rel.end == node_id => rel.start,
                _ => return false,
            };
            store.nodes.get(&other).is_some_and(|n| {
                n.label == hop.target_label && n.props.get(&pred.property) == Some(&pred.value)
            })
        }),
    }
}

#[async_trait]
impl GraphBackend for MemBackend {
    async fn apply(&self, ops: &[WriteOp]) -> Result<Vec<Option<EntityId>>, GraphError> {
        self.apply_calls.fetch_add(1, AtomicOrdering::SeqCst);

        let mut store = self.lock();
        // Copy-on-write: mutate a clone, commit only if the whole batch holds.
        let mut work = store.clone();
        let mut assigned: Vec<Option<EntityId>> = Vec::with_capacity(ops.len());

        for op in ops {
            match op {
                WriteOp::CreateNode { label, props } => {
                    let id = work.assign_id();
                    work.nodes.insert(
                        id,
                        StoredNode {
                            label: label.clone(),
                            props: props.clone(),
                        },
                    );
                    assigned.push(Some(EntityId(id)));
                }
                WriteOp::UpdateNode { id, set, unset } => {
                    let node = work.nodes.get_mut(&id.0).ok_or_else(|| {
                        GraphError::BadBatch(format!("update of unknown node {id}"))
                    })?;
                    for (k, v) in set {
                        node.props.insert(k.clone(), v.clone());
                    }
                    for k in unset {
                        node.props.remove(k);
                    }
                    assigned.push(None);
                }
                WriteOp::DeleteNode { id } => {
                    work.nodes.remove(&id.0);
                    // Detach: drop every relationship touching the node.
                    work.rels
                        .retain(|_, r| r.start != id.0 && r.end != id.0);
                    assigned.push(None);
                }
                WriteOp::CreateRel {
                    rel_type,
                    start,
                    end,
                    props,
                } => {
                    let start = resolve_handle(*start, &assigned)?;
                    let end = resolve_handle(*end, &assigned)?;
                    let id = work.assign_id();
                    work.rels.insert(
                        id,
                        StoredRel {
                            rel_type: rel_type.clone(),
                            start,
                            end,
                            props: props.clone(),
                        },
                    );
                    assigned.push(Some(EntityId(id)));
                }
                WriteOp::UpdateRel { id, set, unset } => {
                    let rel = work.rels.get_mut(&id.0).ok_or_else(|| {
                        GraphError::BadBatch(format!("update of unknown relationship {id}"))
                    })?;
                    for (k, v) in set {
                        rel.props.insert(k.clone(), v.clone());
                    }
                    for k in unset {
                        rel.props.remove(k);
                    }
                    assigned.push(None);
                }
                WriteOp::DeleteRel { id } => {
                    work.rels.remove(&id.0);
                    assigned.push(None);
                }
            }
        }

        self.check_constraints(&work)?;
        *store = work;
        Ok(assigned)
    }

    async fn fetch_node(
        &self,
        label: &str,
        id: EntityId,
    ) -> Result<Option<NodeRecord>, GraphError> {
        let store = self.lock();
        Ok(store
            .nodes
            .get(&id.0)
            .filter(|n| n.label == label)
            .map(|n| node_record(id.0, n)))
    }

    async fn neighbors(&self, ids: &[EntityId]) -> Result<Vec<NeighborRecord>, GraphError> {
        let store = self.lock();
        let mut out = Vec::new();
        for id in ids {
            for (rid, rel) in &store.rels {
                let other = if rel.start == id.0 {
                    rel.end
                } else if rel.end == id.0 {
                    rel.start
                } else {
                    continue;
                };
                let Some(node) = store.nodes.get(&other) else {
                    continue;
                };
                out.push(NeighborRecord {
                    of: *id,
                    rel: rel_record(*rid, rel),
                    node: node_record(other, node),
                });
            }
        }
        Ok(out)
    }

    async fn list(
        &self,
        label: &str,
        sort: &SortOrder,
        page: &Page,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let store = self.lock();
        let mut rows: Vec<(i64, &StoredNode)> = store
            .nodes
            .iter()
            .filter(|(_, n)| n.label == label)
            .map(|(id, n)| (*id, n))
            .collect();

        rows.sort_by(|(aid, a), (bid, b)| {
            let ord = match (a.props.get(&sort.property), b.props.get(&sort.property)) {
                (Some(av), Some(bv)) => av.sort_cmp(bv),
                // Nodes missing the sort property go last in either direction.
                (Some(_), None) => return std::cmp::Ordering::Less,
                (None, Some(_)) => return std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            let ord = match sort.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            ord.then(aid.cmp(bid))
        });

        Ok(rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .map(|(id, n)| node_record(id, n))
            .collect())
    }

    async fn find(&self, finder: &BoundFinder) -> Result<Vec<NodeRecord>, GraphError> {
        let store = self.lock();
        Ok(store
            .nodes
            .iter()
            .filter(|(_, n)| n.label == finder.label)
            .filter(|(id, _)| {
                finder
                    .predicates
                    .iter()
                    .all(|p| matches_predicate(&store, **id, p))
            })
            .map(|(id, n)| node_record(*id, n))
            .collect())
    }

    async fn run(&self, _statement: &BoundStatement) -> Result<Vec<Row>, GraphError> {
        Err(GraphError::Unsupported(
            "explicit query execution requires a database backend",
        ))
    }

    async fn count(&self, label: &str) -> Result<i64, GraphError> {
        let store = self.lock();
        Ok(store.nodes.values().filter(|n| n.label == label).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, WireValue)]) -> BTreeMap<String, WireValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let backend = MemBackend::new();
        let assigned = backend
            .apply(&[
                WriteOp::CreateNode {
                    label: "Ingredient".into(),
                    props: props(&[("name", WireValue::Text("sage".into()))]),
                },
                WriteOp::CreateNode {
                    label: "Ingredient".into(),
                    props: props(&[("name", WireValue::Text("apple".into()))]),
                },
            ])
            .await
            .unwrap();

        assert_eq!(assigned, vec![Some(EntityId(0)), Some(EntityId(1))]);
        assert_eq!(backend.count("Ingredient").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn batch_rel_to_created_node() {
        let backend = MemBackend::new();
        let assigned = backend
            .apply(&[
                WriteOp::CreateNode {
                    label: "Recipe".into(),
                    props: props(&[("name", WireValue::Text("soup".into()))]),
                },
                WriteOp::CreateNode {
                    label: "Ingredient".into(),
                    props: props(&[("name", WireValue::Text("leek".into()))]),
                },
                WriteOp::CreateRel {
                    rel_type: "CONTAINS".into(),
                    start: NodeHandle::Created(0),
                    end: NodeHandle::Created(1),
                    props: BTreeMap::new(),
                },
            ])
            .await
            .unwrap();

        assert!(assigned[2].is_some());
        let neighbors = backend.neighbors(&[assigned[0].unwrap()]).await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].rel.rel_type, "CONTAINS");
        assert_eq!(neighbors[0].node.label, "Ingredient");
    }

    #[tokio::test]
    async fn constraint_violation_applies_nothing() {
        let backend = MemBackend::new().with_unique("Ingredient", "name");
        backend
            .apply(&[WriteOp::CreateNode {
                label: "Ingredient".into(),
                props: props(&[("name", WireValue::Text("sage".into()))]),
            }])
            .await
            .unwrap();

        let err = backend
            .apply(&[
                WriteOp::CreateNode {
                    label: "Ingredient".into(),
                    props: props(&[("name", WireValue::Text("thyme".into()))]),
                },
                WriteOp::CreateNode {
                    label: "Ingredient".into(),
                    props: props(&[("name", WireValue::Text("sage".into()))]),
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::ConstraintViolation { .. }));

        // All-or-nothing: the non-violating create rolled back too.
        assert_eq!(backend.count("Ingredient").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_node_detaches_relationships() {
        let backend = MemBackend::new();
        let assigned = backend
            .apply(&[
                WriteOp::CreateNode {
                    label: "A".into(),
                    props: BTreeMap::new(),
                },
                WriteOp::CreateNode {
                    label: "B".into(),
                    props: BTreeMap::new(),
                },
                WriteOp::CreateRel {
                    rel_type: "LINKS".into(),
                    start: NodeHandle::Created(0),
                    end: NodeHandle::Created(1),
                    props: BTreeMap::new(),
                },
            ])
            .await
            .unwrap();

        backend
            .apply(&[WriteOp::DeleteNode {
                id: assigned[0].unwrap(),
            }])
            .await
            .unwrap();

        assert_eq!(backend.node_count(), 1);
        assert_eq!(backend.rel_count(), 0);
    }

    #[tokio::test]
    async fn list_sorts_and_paginates() {
        let backend = MemBackend::new();
        let mut ops = Vec::new();
        for i in 0..8 {
            ops.push(WriteOp::CreateNode {
                label: "Recipe".into(),
                props: props(&[("dateAdded", WireValue::Text(format!("2024-01-0{}", i + 1)))]),
            });
        }
        backend.apply(&ops).await.unwrap();

        let page = backend
            .list(
                "Recipe",
                &SortOrder::desc("dateAdded"),
                &Page::new(0, 5),
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 5);
        let dates: Vec<&str> = page
            .iter()
            .map(|n| n.props.get("dateAdded").unwrap().as_text().unwrap())
            .collect();
        let mut sorted = dates.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(dates, sorted);
        assert_eq!(dates[0], "2024-01-08");
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let backend = std::sync::Arc::new(MemBackend::new());
        let poisoner = std::sync::Arc::clone(&backend);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.store.lock().unwrap();
            panic!("poison the store lock");
        })
        .join();

        assert!(backend.store.is_poisoned());
        assert_eq!(backend.node_count(), 0);
    }

    #[tokio::test]
    async fn run_is_unsupported() {
        let backend = MemBackend::new();
        let stmt = relish_query::Statement::parse("MATCH (n) RETURN n")
            .unwrap()
            .bind(vec![])
            .unwrap();
        assert!(matches!(
            backend.run(&stmt).await,
            Err(GraphError::Unsupported(_))
        ));
    }
}
