//! relish-core: Shared types for the Relish object-graph mapper.
//!
//! This crate provides the foundational types used across all Relish crates:
//! - The in-memory and wire-level property value models
//! - The entity arena (`EntityGraph`) used to represent loaded object graphs
//! - Property converters bridging rich values and wire-representable ones
//! - Sort, pagination, and traversal-depth descriptors
//! - Configuration management

pub mod config;
pub mod convert;
pub mod entity;
pub mod types;
pub mod value;

pub use config::RelishConfig;
pub use convert::{ConvertError, DateTimeText, Passthrough, ValueConverter};
pub use entity::{Entity, EntityGraph, EntityId, EntityRef, RelLink, RelSlot};
pub use types::{Depth, Direction, Page, SortDirection, SortOrder};
pub use value::{Value, WireValue};
