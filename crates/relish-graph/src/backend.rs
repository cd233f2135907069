//! The backend boundary: structured operations, records, and the
//! [`GraphBackend`] trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use relish_core::{EntityId, Page, SortOrder, WireValue};
use relish_query::{BoundFinder, BoundStatement};

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Failed to decode result row: {0}")]
    Decode(String),

    #[error("Unique constraint violated on {label}.{property}")]
    ConstraintViolation { label: String, property: String },

    #[error("Malformed write batch: {0}")]
    BadBatch(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

// ── Records ───────────────────────────────────────────────────────

/// A node as returned from the database: identity, label, wire properties.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub id: EntityId,
    pub label: String,
    pub props: BTreeMap<String, WireValue>,
}

/// A relationship as returned from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct RelRecord {
    pub id: EntityId,
    pub rel_type: String,
    pub start: EntityId,
    pub end: EntityId,
    pub props: BTreeMap<String, WireValue>,
}

/// One frontier expansion result: a relationship touching `of`, together
/// with the node at its far end.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborRecord {
    pub of: EntityId,
    pub rel: RelRecord,
    pub node: NodeRecord,
}

/// A tabular result row from explicit query execution.
pub type Row = BTreeMap<String, WireValue>;

// ── Write Operations ──────────────────────────────────────────────

/// Reference to a node within a write batch: either already persisted, or
/// created earlier in the same batch (by op index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHandle {
    Existing(EntityId),
    Created(usize),
}

/// One element of a change set, applied transactionally as part of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    CreateNode {
        label: String,
        props: BTreeMap<String, WireValue>,
    },
    UpdateNode {
        id: EntityId,
        set: BTreeMap<String, WireValue>,
        unset: Vec<String>,
    },
    DeleteNode {
        id: EntityId,
    },
    CreateRel {
        rel_type: String,
        start: NodeHandle,
        end: NodeHandle,
        props: BTreeMap<String, WireValue>,
    },
    UpdateRel {
        id: EntityId,
        set: BTreeMap<String, WireValue>,
        unset: Vec<String>,
    },
    DeleteRel {
        id: EntityId,
    },
}

impl WriteOp {
    pub fn is_create(&self) -> bool {
        matches!(self, WriteOp::CreateNode { .. } | WriteOp::CreateRel { .. })
    }
}

// ── Backend Trait ─────────────────────────────────────────────────

/// A graph database backend.
///
/// Shared across sessions (behind an `Arc`); each method is one synchronous
/// round trip from the caller's perspective. Consistency under concurrent
/// writers is delegated to the database's transactional guarantees.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Apply a write batch transactionally. Returns, positionally per op, the
    /// database-assigned identity of each create (and `None` for the rest).
    /// On failure nothing is applied.
    async fn apply(&self, ops: &[WriteOp]) -> Result<Vec<Option<EntityId>>, GraphError>;

    /// Fetch a single node by label and identity.
    async fn fetch_node(
        &self,
        label: &str,
        id: EntityId,
    ) -> Result<Option<NodeRecord>, GraphError>;

    /// One-hop frontier expansion: every relationship touching any of `ids`,
    /// with the node at the far end.
    async fn neighbors(&self, ids: &[EntityId]) -> Result<Vec<NeighborRecord>, GraphError>;

    /// Sorted, paginated label scan. Sort and pagination run at the query
    /// level and always reflect the latest committed state.
    async fn list(
        &self,
        label: &str,
        sort: &SortOrder,
        page: &Page,
    ) -> Result<Vec<NodeRecord>, GraphError>;

    /// Execute a derived finder (AND of property-path predicates), in stable
    /// identity order.
    async fn find(&self, finder: &BoundFinder) -> Result<Vec<NodeRecord>, GraphError>;

    /// Execute an explicit parameterized query, returning tabular rows.
    async fn run(&self, statement: &BoundStatement) -> Result<Vec<Row>, GraphError>;

    /// Count nodes of a label.
    async fn count(&self, label: &str) -> Result<i64, GraphError>;
}
