//! The unit-of-work session.
//!
//! A session owns a snapshot table keyed by entity identity and mediates
//! every read and write of one logical unit of work. Reads hydrate arena
//! graphs and record snapshots; `save` diffs the reachable subgraph against
//! those snapshots and applies the minimal batch in one transaction. A
//! session is cheap, single-owner, and explicitly closed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use relish_core::{Depth, EntityGraph, EntityId, EntityRef, Page, Passthrough, SortOrder, Value, ValueConverter};
use relish_graph::{GraphBackend, NodeRecord, WriteOp};
use relish_query::{BoundStatement, Finder, RowShape, Statement};
use relish_schema::Schema;
use tracing::{debug, info};

use crate::changeset::{self, SaveReport};
use crate::error::{Result, SessionError};
use crate::mapper;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Open, tracking nothing yet.
    Empty,
    /// Open, with at least one tracked entity.
    Populated,
    /// Closed; every operation fails.
    Closed,
}

/// A single entity loaded together with its reachable subgraph.
pub struct Loaded {
    pub graph: EntityGraph,
    pub root: EntityRef,
}

/// A page of entities sharing one arena.
pub struct LoadedPage {
    pub graph: EntityGraph,
    pub roots: Vec<EntityRef>,
}

/// Result of an explicit query: tabular rows, or mapped entities when the
/// statement declared an entity row shape.
pub enum QueryResult {
    Rows(Vec<BTreeMap<String, Value>>),
    Entities(LoadedPage),
}

pub struct Session {
    schema: Arc<Schema>,
    backend: Arc<dyn GraphBackend>,
    snapshots: HashMap<EntityId, Snapshot>,
    status: SessionStatus,
}

impl Session {
    pub fn new(schema: Arc<Schema>, backend: Arc<dyn GraphBackend>) -> Self {
        Self {
            schema,
            backend,
            snapshots: HashMap::new(),
            status: SessionStatus::Empty,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Load one entity by identity, hydrating its subgraph out to `depth`.
    pub async fn load(
        &mut self,
        kind: &str,
        id: EntityId,
        depth: Depth,
    ) -> Result<Option<Loaded>> {
        self.ensure_open()?;
        let label = self.node_label(kind)?;

        let Some(record) = self.backend.fetch_node(&label, id).await? else {
            return Ok(None);
        };
        let (graph, roots) = mapper::hydrate(
            &self.schema,
            self.backend.as_ref(),
            kind,
            vec![record],
            depth,
        )
        .await?;
        let root = roots[0];

        self.track(&graph)?;
        debug!(kind, id = id.0, entities = graph.len(), "loaded entity");
        Ok(Some(Loaded { graph, root }))
    }

    /// Load a sorted, paginated slice of a kind. Always answered from the
    /// backend, never from tracked state, so the slice reflects the latest
    /// committed writes.
    pub async fn load_all(
        &mut self,
        kind: &str,
        sort: &SortOrder,
        page: &Page,
        depth: Depth,
    ) -> Result<LoadedPage> {
        self.ensure_open()?;
        let label = self.node_label(kind)?;

        let records = self.backend.list(&label, sort, page).await?;
        let (graph, roots) = mapper::hydrate(
            &self.schema,
            self.backend.as_ref(),
            kind,
            records,
            depth,
        )
        .await?;

        self.track(&graph)?;
        Ok(LoadedPage { graph, roots })
    }

    /// Execute a finder derived from its name (`by_x_and_y` grammar) with
    /// positional arguments.
    pub async fn find_by(
        &mut self,
        kind: &str,
        finder_name: &str,
        args: Vec<Value>,
        depth: Depth,
    ) -> Result<LoadedPage> {
        self.ensure_open()?;
        let finder = Finder::derive(&self.schema, kind, finder_name)?;
        let bound = finder.bind(&self.schema, args)?;

        let records = self.backend.find(&bound).await?;
        let (graph, roots) = mapper::hydrate(
            &self.schema,
            self.backend.as_ref(),
            kind,
            records,
            depth,
        )
        .await?;

        self.track(&graph)?;
        Ok(LoadedPage { graph, roots })
    }

    /// Execute an explicit parameterized statement.
    pub async fn run(&mut self, statement: &Statement, args: Vec<Value>) -> Result<QueryResult> {
        self.ensure_open()?;
        let bound = statement.bind(args)?;
        match bound.shape.clone() {
            RowShape::Maps => {
                let rows = self.backend.run(&bound).await?;
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut map = BTreeMap::new();
                    for (column, wire) in row {
                        map.insert(column, Passthrough.from_wire(&wire)?);
                    }
                    out.push(map);
                }
                Ok(QueryResult::Rows(out))
            }
            RowShape::Entities { kind } => {
                let page = self.run_entities(&bound, &kind).await?;
                Ok(QueryResult::Entities(page))
            }
        }
    }

    /// Save the subgraph reachable from `root`: compute the change set, apply
    /// it transactionally, write database-assigned identities back into the
    /// arena, and refresh snapshots. A clean graph touches the backend not
    /// at all.
    pub async fn save(&mut self, graph: &mut EntityGraph, root: EntityRef) -> Result<SaveReport> {
        self.ensure_open()?;
        let cs = changeset::compute(&self.schema, graph, root, &self.snapshots)?;
        if cs.is_empty() {
            // Refresh tracking for the walked subgraph only; entities the
            // walk never reached keep their dirty state.
            for &r in &cs.visited {
                self.track_one(graph, r)?;
            }
            if self.status == SessionStatus::Empty {
                self.status = SessionStatus::Populated;
            }
            return Ok(SaveReport::default());
        }

        let report = SaveReport::from_ops(&cs.ops);
        let assigned = self.backend.apply(&cs.ops).await?;

        for &(r, op_idx) in &cs.created_nodes {
            let id = created_id(&assigned, op_idx)?;
            graph.get_mut(r).id = Some(id);
        }
        for (r, field, link_idx, op_idx) in &cs.created_rels {
            let id = created_id(&assigned, *op_idx)?;
            let e = graph.get_mut(*r);
            match e.rels.get_mut(field).map(|s| s.links_mut()) {
                Some(links) if *link_idx < links.len() => links[*link_idx].id = Some(id),
                _ => {
                    return Err(SessionError::Internal(format!(
                        "created link '{field}' vanished before id writeback"
                    )))
                }
            }
        }

        for &r in &cs.visited {
            self.track_one(graph, r)?;
        }
        self.status = SessionStatus::Populated;
        info!(
            nodes_created = report.nodes_created,
            rels_created = report.rels_created,
            total = report.total(),
            "applied change set"
        );
        Ok(report)
    }

    /// Delete a persisted entity's node, detaching its relationships.
    ///
    /// The arena entry reverts to detached, and links pointing at it are
    /// dropped from the other arena entities and from tracked snapshots —
    /// otherwise a later save of a neighbor would re-create the node.
    pub async fn delete(&mut self, graph: &mut EntityGraph, entity: EntityRef) -> Result<()> {
        self.ensure_open()?;
        let e = graph.get(entity);
        let id = e.id.ok_or_else(|| SessionError::Detached {
            kind: e.kind.clone(),
        })?;

        self.backend.apply(&[WriteOp::DeleteNode { id }]).await?;
        self.snapshots.remove(&id);
        graph.get_mut(entity).id = None;

        for i in 0..graph.len() {
            let r = EntityRef(i);
            if r == entity {
                continue;
            }
            let fields: Vec<String> = graph.get(r).rels.keys().cloned().collect();
            for field in fields {
                graph.get_mut(r).remove_links_to(&field, entity);
            }
        }
        for snap in self.snapshots.values_mut() {
            for entries in snap.rels.values_mut().flatten() {
                entries.retain(|rel| rel.target != id);
            }
        }

        debug!(id = id.0, "deleted entity");
        Ok(())
    }

    pub async fn count(&mut self, kind: &str) -> Result<i64> {
        self.ensure_open()?;
        let label = self.node_label(kind)?;
        Ok(self.backend.count(&label).await?)
    }

    /// Close the session. Tracked state is discarded; every subsequent
    /// operation returns [`SessionError::Closed`].
    pub fn close(&mut self) {
        self.snapshots.clear();
        self.status = SessionStatus::Closed;
    }

    // ── Internals ─────────────────────────────────────────────────

    async fn run_entities(&mut self, bound: &BoundStatement, kind: &str) -> Result<LoadedPage> {
        let label = self.node_label(kind)?;
        let rows = self.backend.run(bound).await?;

        let mut records: Vec<NodeRecord> = Vec::with_capacity(rows.len());
        for row in rows {
            let id = match row.get("id") {
                Some(relish_core::WireValue::Int(v)) => EntityId(*v),
                _ => {
                    return Err(SessionError::Internal(
                        "entity-shaped statement must return an integer 'id' column".into(),
                    ))
                }
            };
            if let Some(record) = self.backend.fetch_node(&label, id).await? {
                records.push(record);
            }
        }

        let (graph, roots) = mapper::hydrate(
            &self.schema,
            self.backend.as_ref(),
            kind,
            records,
            Depth::Hops(0),
        )
        .await?;
        self.track(&graph)?;
        Ok(LoadedPage { graph, roots })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.status == SessionStatus::Closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    fn node_label(&self, kind: &str) -> Result<String> {
        let meta = self.schema.get(kind).ok_or_else(|| SessionError::UnknownKind {
            kind: kind.to_string(),
        })?;
        if !meta.is_node() {
            return Err(SessionError::NotANodeKind {
                kind: kind.to_string(),
            });
        }
        Ok(meta.label().to_string())
    }

    /// Record snapshots for every persisted entity in an arena.
    fn track(&mut self, graph: &EntityGraph) -> Result<()> {
        for (r, _) in graph.iter() {
            self.track_one(graph, r)?;
        }
        if !graph.is_empty() && self.status == SessionStatus::Empty {
            self.status = SessionStatus::Populated;
        }
        Ok(())
    }

    fn track_one(&mut self, graph: &EntityGraph, r: EntityRef) -> Result<()> {
        if let Some(id) = graph.get(r).id {
            let snap = Snapshot::capture(&self.schema, graph, r)?;
            self.snapshots.insert(id, snap);
        }
        Ok(())
    }
}

fn created_id(assigned: &[Option<EntityId>], op_idx: usize) -> Result<EntityId> {
    assigned
        .get(op_idx)
        .copied()
        .flatten()
        .ok_or_else(|| SessionError::Internal(format!("create op {op_idx} returned no identity")))
}
