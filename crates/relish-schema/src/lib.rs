//! relish-schema: the metadata registry for the Relish object-graph mapper.
//!
//! Entity declarations are collected through a builder, validated once at
//! startup, and frozen into an immutable [`Schema`] shared (behind an `Arc`)
//! for the process lifetime. All mapping decisions — node labels, relationship
//! types, field-to-property names, converters — flow from here.

pub mod definition;
pub mod error;
pub mod schema;

pub use definition::{EntityDef, PropDef, RelationDef};
pub use error::ConfigurationError;
pub use schema::{EntityMeta, EntityShape, Schema, SchemaBuilder};
