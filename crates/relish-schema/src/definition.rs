//! Entity declaration builders.
//!
//! An [`EntityDef`] describes one node kind or relationship-entity kind:
//! its label or relationship type, identity field, scalar fields with their
//! persisted property names, relationship fields, and per-field converters.
//! Definitions are inert until validated by [`crate::SchemaBuilder`].

use std::sync::Arc;

use relish_core::{Direction, ValueConverter};

/// A declared scalar field and its persisted property name.
#[derive(Debug, Clone)]
pub struct PropDef {
    pub field: String,
    pub property: String,
}

/// A declared relationship field.
#[derive(Debug, Clone)]
pub struct RelationDef {
    pub field: String,
    pub rel_type: String,
    pub direction: Direction,
    pub target_kind: String,
    /// Relationship-entity kind when the edge carries its own properties.
    pub via: Option<String>,
}

/// What an entity kind persists as.
#[derive(Debug, Clone)]
pub enum ShapeDef {
    Node { label: String },
    Relationship { rel_type: String },
}

/// One entity kind declaration, collected by the schema builder.
pub struct EntityDef {
    pub(crate) kind: String,
    pub(crate) shape: ShapeDef,
    pub(crate) identity: Option<String>,
    pub(crate) endpoints: Option<(String, String)>,
    pub(crate) props: Vec<PropDef>,
    pub(crate) relations: Vec<RelationDef>,
    pub(crate) converters: Vec<(String, Arc<dyn ValueConverter>)>,
}

impl EntityDef {
    /// Declare a node kind persisted under the given label.
    pub fn node(kind: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            shape: ShapeDef::Node {
                label: label.into(),
            },
            identity: None,
            endpoints: None,
            props: Vec::new(),
            relations: Vec::new(),
            converters: Vec::new(),
        }
    }

    /// Declare a relationship-entity kind persisted as the given type.
    pub fn relationship(kind: impl Into<String>, rel_type: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            shape: ShapeDef::Relationship {
                rel_type: rel_type.into(),
            },
            identity: None,
            endpoints: None,
            props: Vec::new(),
            relations: Vec::new(),
            converters: Vec::new(),
        }
    }

    /// Name the field through which the database identity is exposed.
    pub fn identity(mut self, field: impl Into<String>) -> Self {
        self.identity = Some(field.into());
        self
    }

    /// Declare the start and end kinds of a relationship entity.
    pub fn endpoints(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.endpoints = Some((start.into(), end.into()));
        self
    }

    /// Declare a scalar field persisted under its own name.
    pub fn prop(self, field: impl Into<String>) -> Self {
        let field = field.into();
        let property = field.clone();
        self.prop_named(field, property)
    }

    /// Declare a scalar field with an explicit persisted property name.
    pub fn prop_named(mut self, field: impl Into<String>, property: impl Into<String>) -> Self {
        self.props.push(PropDef {
            field: field.into(),
            property: property.into(),
        });
        self
    }

    /// Declare a plain relationship field.
    pub fn relation(
        mut self,
        field: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
        target_kind: impl Into<String>,
    ) -> Self {
        self.relations.push(RelationDef {
            field: field.into(),
            rel_type: rel_type.into(),
            direction,
            target_kind: target_kind.into(),
            via: None,
        });
        self
    }

    /// Declare a relationship field whose edges carry properties, described
    /// by a separate relationship-entity kind.
    pub fn relation_via(
        mut self,
        field: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
        target_kind: impl Into<String>,
        via: impl Into<String>,
    ) -> Self {
        self.relations.push(RelationDef {
            field: field.into(),
            rel_type: rel_type.into(),
            direction,
            target_kind: target_kind.into(),
            via: Some(via.into()),
        });
        self
    }

    /// Register a converter for one declared scalar field.
    pub fn converter(
        mut self,
        field: impl Into<String>,
        converter: Arc<dyn ValueConverter>,
    ) -> Self {
        self.converters.push((field.into(), converter));
        self
    }
}
