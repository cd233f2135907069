//! The validated, immutable metadata registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use relish_core::{ConvertError, Passthrough, Value, ValueConverter, WireValue};

use crate::definition::{EntityDef, PropDef, RelationDef, ShapeDef};
use crate::error::ConfigurationError;

/// Persistence shape of a validated entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityShape {
    Node {
        label: String,
    },
    Relationship {
        rel_type: String,
        start_kind: String,
        end_kind: String,
    },
}

/// Validated persistence metadata for one entity kind.
pub struct EntityMeta {
    pub kind: String,
    pub shape: EntityShape,
    pub identity_field: String,
    props: BTreeMap<String, PropDef>,
    relations: BTreeMap<String, RelationDef>,
    converters: BTreeMap<String, Arc<dyn ValueConverter>>,
}

impl std::fmt::Debug for EntityMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMeta")
            .field("kind", &self.kind)
            .field("shape", &self.shape)
            .field("identity_field", &self.identity_field)
            .field("props", &self.props)
            .field("relations", &self.relations)
            // Converters are opaque trait objects; show which fields have one.
            .field("converters", &self.converters.keys())
            .finish()
    }
}

impl EntityMeta {
    /// Node label, or the relationship type for relationship entities.
    pub fn label(&self) -> &str {
        match &self.shape {
            EntityShape::Node { label } => label,
            EntityShape::Relationship { rel_type, .. } => rel_type,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self.shape, EntityShape::Node { .. })
    }

    /// Persisted property name of a declared scalar field.
    pub fn property_name(&self, field: &str) -> Option<&str> {
        self.props.get(field).map(|p| p.property.as_str())
    }

    /// Declared field name for a persisted property, the reverse mapping.
    pub fn field_for_property(&self, property: &str) -> Option<&str> {
        self.props
            .values()
            .find(|p| p.property == property)
            .map(|p| p.field.as_str())
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.props.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &PropDef> {
        self.props.values()
    }

    pub fn relation(&self, field: &str) -> Option<&RelationDef> {
        self.relations.get(field)
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations.values()
    }

    /// Converter for a field; falls back to the pass-through converter.
    pub fn converter(&self, field: &str) -> &dyn ValueConverter {
        static PASSTHROUGH: Passthrough = Passthrough;
        self.converters
            .get(field)
            .map(|c| c.as_ref())
            .unwrap_or(&PASSTHROUGH)
    }

    /// Convert a field value to its wire form through the registered converter.
    pub fn to_wire(&self, field: &str, value: &Value) -> Result<WireValue, ConvertError> {
        self.converter(field).to_wire(value)
    }

    /// Convert a persisted value back to its in-memory form.
    pub fn from_wire(&self, field: &str, value: &WireValue) -> Result<Value, ConvertError> {
        self.converter(field).from_wire(value)
    }
}

/// The read-only metadata registry, built once at startup.
#[derive(Debug)]
pub struct Schema {
    entities: BTreeMap<String, EntityMeta>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            defs: Vec::new(),
        }
    }

    pub fn get(&self, kind: &str) -> Option<&EntityMeta> {
        self.entities.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}

/// Collects entity declarations and validates them into a [`Schema`].
pub struct SchemaBuilder {
    defs: Vec<EntityDef>,
}

impl SchemaBuilder {
    pub fn entity(mut self, def: EntityDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Validate every declaration and freeze the registry.
    pub fn build(self) -> Result<Schema, ConfigurationError> {
        let mut entities: BTreeMap<String, EntityMeta> = BTreeMap::new();

        // First pass: per-entity structural checks, so the second pass can
        // resolve cross-kind references against the full kind set.
        for def in &self.defs {
            if entities.contains_key(&def.kind) {
                return Err(ConfigurationError::DuplicateKind {
                    kind: def.kind.clone(),
                });
            }
            entities.insert(def.kind.clone(), validate_entity(def)?);
        }

        for def in &self.defs {
            validate_references(def, &entities)?;
        }

        tracing::debug!(kinds = entities.len(), "Schema registry built");
        Ok(Schema { entities })
    }
}

fn validate_entity(def: &EntityDef) -> Result<EntityMeta, ConfigurationError> {
    let identity_field = def
        .identity
        .clone()
        .ok_or_else(|| ConfigurationError::MissingIdentity {
            kind: def.kind.clone(),
        })?;

    let shape = match &def.shape {
        ShapeDef::Node { label } => EntityShape::Node {
            label: label.clone(),
        },
        ShapeDef::Relationship { rel_type } => {
            if !def.relations.is_empty() {
                return Err(ConfigurationError::RelationOnRelationship {
                    kind: def.kind.clone(),
                });
            }
            let (start_kind, end_kind) =
                def.endpoints
                    .clone()
                    .ok_or_else(|| ConfigurationError::MissingEndpoints {
                        kind: def.kind.clone(),
                    })?;
            EntityShape::Relationship {
                rel_type: rel_type.clone(),
                start_kind,
                end_kind,
            }
        }
    };

    let mut props = BTreeMap::new();
    let mut properties_seen = BTreeMap::new();
    for p in &def.props {
        if p.field == identity_field {
            return Err(ConfigurationError::DuplicateField {
                kind: def.kind.clone(),
                field: p.field.clone(),
            });
        }
        if props.insert(p.field.clone(), p.clone()).is_some() {
            return Err(ConfigurationError::DuplicateField {
                kind: def.kind.clone(),
                field: p.field.clone(),
            });
        }
        if properties_seen.insert(p.property.clone(), ()).is_some() {
            return Err(ConfigurationError::DuplicateProperty {
                kind: def.kind.clone(),
                property: p.property.clone(),
            });
        }
    }

    let mut relations = BTreeMap::new();
    for r in &def.relations {
        if props.contains_key(&r.field) || r.field == identity_field {
            return Err(ConfigurationError::DuplicateField {
                kind: def.kind.clone(),
                field: r.field.clone(),
            });
        }
        if relations.insert(r.field.clone(), r.clone()).is_some() {
            return Err(ConfigurationError::DuplicateField {
                kind: def.kind.clone(),
                field: r.field.clone(),
            });
        }
    }

    let mut converters = BTreeMap::new();
    for (field, conv) in &def.converters {
        if !props.contains_key(field) {
            return Err(ConfigurationError::UnknownConverterField {
                kind: def.kind.clone(),
                field: field.clone(),
            });
        }
        converters.insert(field.clone(), Arc::clone(conv));
    }

    Ok(EntityMeta {
        kind: def.kind.clone(),
        shape,
        identity_field,
        props,
        relations,
        converters,
    })
}

fn validate_references(
    def: &EntityDef,
    entities: &BTreeMap<String, EntityMeta>,
) -> Result<(), ConfigurationError> {
    if let Some((start, end)) = &def.endpoints {
        for target in [start, end] {
            if !entities.contains_key(target) {
                return Err(ConfigurationError::UnknownKind {
                    kind: def.kind.clone(),
                    field: "endpoints".to_string(),
                    target: target.clone(),
                });
            }
        }
    }

    for r in &def.relations {
        if !entities.contains_key(&r.target_kind) {
            return Err(ConfigurationError::UnknownKind {
                kind: def.kind.clone(),
                field: r.field.clone(),
                target: r.target_kind.clone(),
            });
        }
        if let Some(via) = &r.via {
            let Some(meta) = entities.get(via) else {
                return Err(ConfigurationError::UnknownKind {
                    kind: def.kind.clone(),
                    field: r.field.clone(),
                    target: via.clone(),
                });
            };
            match &meta.shape {
                EntityShape::Relationship { rel_type, .. } => {
                    if rel_type != &r.rel_type {
                        return Err(ConfigurationError::RelTypeMismatch {
                            kind: def.kind.clone(),
                            field: r.field.clone(),
                            via: via.clone(),
                            declared: r.rel_type.clone(),
                            actual: rel_type.clone(),
                        });
                    }
                }
                EntityShape::Node { .. } => {
                    return Err(ConfigurationError::NotARelationshipEntity {
                        kind: def.kind.clone(),
                        field: r.field.clone(),
                        via: via.clone(),
                    });
                }
            }
        }
    }

    Ok(())
}
