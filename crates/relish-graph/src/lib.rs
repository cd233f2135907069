//! relish-graph: database backends for the Relish object-graph mapper.
//!
//! This crate is the single point of contact with the database. The mapper
//! and session crates speak [`GraphBackend`] — structured write batches,
//! frontier expansion, sorted scans, derived finders, and explicit query
//! execution — and never build query text themselves.
//!
//! Two implementations ship: [`Neo4jBackend`] over a pooled neo4rs
//! connection, and [`MemBackend`], an embedded store used by tests and local
//! development.

pub mod backend;
pub mod mem;
pub mod neo4j;

pub use backend::{
    GraphBackend, GraphError, NeighborRecord, NodeHandle, NodeRecord, RelRecord, Row, WriteOp,
};
pub use mem::MemBackend;
pub use neo4j::Neo4jBackend;
