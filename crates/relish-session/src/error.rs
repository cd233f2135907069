//! Error types for the relish-session crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session is closed; no further operations are valid")]
    Closed,

    #[error("Unknown entity kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("Entity kind '{kind}' has no declared field '{field}'")]
    UnknownField { kind: String, field: String },

    #[error("Kind '{kind}' is a relationship entity; sessions load and save node kinds")]
    NotANodeKind { kind: String },

    #[error("Entity of kind '{kind}' has no identity; it was never persisted")]
    Detached { kind: String },

    #[error("Conversion error: {0}")]
    Convert(#[from] relish_core::ConvertError),

    #[error("Graph error: {0}")]
    Graph(#[from] relish_graph::GraphError),

    #[error("Query error: {0}")]
    Query(#[from] relish_query::QueryError),

    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
