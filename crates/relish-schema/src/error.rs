//! Error types for schema construction.
//!
//! All of these are fatal: they surface at startup, before the registry is
//! ever used for mapping.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Entity kind '{kind}' declared more than once")]
    DuplicateKind { kind: String },

    #[error("Entity '{kind}' lacks an identity field")]
    MissingIdentity { kind: String },

    #[error("Relationship entity '{kind}' lacks start/end endpoints")]
    MissingEndpoints { kind: String },

    #[error("Entity '{kind}' declares field '{field}' more than once")]
    DuplicateField { kind: String, field: String },

    #[error("Entity '{kind}' maps two fields to property '{property}'")]
    DuplicateProperty { kind: String, property: String },

    #[error("Entity '{kind}' field '{field}' references unknown kind '{target}'")]
    UnknownKind {
        kind: String,
        field: String,
        target: String,
    },

    #[error("Entity '{kind}' field '{field}': '{via}' is not a relationship entity")]
    NotARelationshipEntity {
        kind: String,
        field: String,
        via: String,
    },

    #[error(
        "Entity '{kind}' field '{field}' uses type '{declared}' but relationship \
         entity '{via}' persists as '{actual}'"
    )]
    RelTypeMismatch {
        kind: String,
        field: String,
        via: String,
        declared: String,
        actual: String,
    },

    #[error("Relationship entity '{kind}' may not declare relationship fields")]
    RelationOnRelationship { kind: String },

    #[error("Entity '{kind}' registers a converter for undeclared field '{field}'")]
    UnknownConverterField { kind: String, field: String },
}
