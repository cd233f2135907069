//! relish-session: the unit-of-work layer of the Relish object-graph mapper.
//!
//! A [`Session`] mediates all reads and writes for one logical unit of work:
//! it loads entity graphs to a bounded depth, tracks snapshots of everything
//! it materializes, and on save diffs the reachable subgraph against those
//! snapshots to produce a minimal transactional write batch. Sessions are
//! created per request, never shared, and explicitly closed.

pub mod changeset;
pub mod error;
pub mod mapper;
pub mod session;
pub mod snapshot;

pub use changeset::{ChangeSet, SaveReport};
pub use error::{Result, SessionError};
pub use session::{Loaded, LoadedPage, QueryResult, Session, SessionStatus};
pub use snapshot::{RelSnapshot, Snapshot};
