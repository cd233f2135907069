//! The entity arena: an index-addressed representation of an object graph.
//!
//! Loaded graphs are frequently cyclic (an ingredient pairs with another that
//! pairs back), so entities live in a flat arena and reference each other by
//! index. Visited-tracking during traversal and diffing is then an index set
//! rather than a pointer-identity scheme.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Database-assigned identity of a node or relationship.
///
/// Assigned synchronously on first create and immutable afterwards; uniquely
/// addresses the entity within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of an entity within an [`EntityGraph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef(pub usize);

// ── Relationship Slots ────────────────────────────────────────────

/// One end of a relationship held by an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RelLink {
    /// Arena index of the target entity.
    pub target: EntityRef,
    /// Relationship identity, `None` until the link is first persisted.
    pub id: Option<EntityId>,
    /// Relationship-entity properties; empty for plain references.
    pub props: BTreeMap<String, Value>,
}

impl RelLink {
    pub fn to(target: EntityRef) -> Self {
        Self {
            target,
            id: None,
            props: BTreeMap::new(),
        }
    }

    pub fn with_prop(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(field.into(), value.into());
        self
    }
}

/// The load state of one declared relationship field.
///
/// `Unresolved` means "beyond the load horizon": the neighbors exist in the
/// database but were not fetched. It is deliberately distinct from
/// `Resolved(vec![])`, which asserts the entity has no such neighbors.
/// Unresolved slots are never diffed, so a shallow load can never produce a
/// spurious relationship delete.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RelSlot {
    #[default]
    Unresolved,
    Resolved(Vec<RelLink>),
}

impl RelSlot {
    pub fn is_resolved(&self) -> bool {
        matches!(self, RelSlot::Resolved(_))
    }

    pub fn links(&self) -> &[RelLink] {
        match self {
            RelSlot::Unresolved => &[],
            RelSlot::Resolved(links) => links,
        }
    }

    pub fn links_mut(&mut self) -> &mut [RelLink] {
        match self {
            RelSlot::Unresolved => &mut [],
            RelSlot::Resolved(links) => links,
        }
    }
}

// ── Entities ──────────────────────────────────────────────────────

/// A typed record representing one node (or relationship entity) in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Schema kind name (e.g. "Recipe").
    pub kind: String,
    /// Database identity; `None` until first save.
    pub id: Option<EntityId>,
    /// Declared scalar properties by field name.
    pub props: BTreeMap<String, Value>,
    /// Declared relationship fields by field name.
    pub rels: BTreeMap<String, RelSlot>,
}

impl Entity {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            props: BTreeMap::new(),
            rels: BTreeMap::new(),
        }
    }

    pub fn with_prop(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(field.into(), value.into());
        self
    }

    pub fn set_prop(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.props.insert(field.into(), value.into());
    }

    pub fn prop(&self, field: &str) -> Option<&Value> {
        self.props.get(field)
    }

    /// Mark a relationship field as loaded with the given links.
    pub fn resolve(&mut self, field: impl Into<String>, links: Vec<RelLink>) {
        self.rels.insert(field.into(), RelSlot::Resolved(links));
    }

    /// Append a link to a relationship field, resolving it if needed.
    pub fn push_link(&mut self, field: impl Into<String>, link: RelLink) {
        match self.rels.entry(field.into()).or_default() {
            RelSlot::Resolved(links) => links.push(link),
            slot @ RelSlot::Unresolved => *slot = RelSlot::Resolved(vec![link]),
        }
    }

    /// Drop any links to `target` from a resolved relationship field.
    ///
    /// Returns how many links were removed. An unresolved slot stays
    /// unresolved: removal only makes sense against loaded state.
    pub fn remove_links_to(&mut self, field: &str, target: EntityRef) -> usize {
        match self.rels.get_mut(field) {
            Some(RelSlot::Resolved(links)) => {
                let before = links.len();
                links.retain(|l| l.target != target);
                before - links.len()
            }
            _ => 0,
        }
    }

    pub fn relation(&self, field: &str) -> Option<&RelSlot> {
        self.rels.get(field)
    }
}

// ── Arena ─────────────────────────────────────────────────────────

/// A flat arena of entities forming one object graph.
///
/// The arena owns the entities; relationship links are indexes into it. The
/// caller's graph is tracked (not owned) by a session for change detection.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    entities: Vec<Entity>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entity: Entity) -> EntityRef {
        self.entities.push(entity);
        EntityRef(self.entities.len() - 1)
    }

    pub fn get(&self, r: EntityRef) -> &Entity {
        &self.entities[r.0]
    }

    pub fn get_mut(&mut self, r: EntityRef) -> &mut Entity {
        &mut self.entities[r.0]
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityRef, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (EntityRef(i), e))
    }

    /// Find the arena entry already holding a persisted identity.
    pub fn find_by_id(&self, id: EntityId) -> Option<EntityRef> {
        self.entities
            .iter()
            .position(|e| e.id == Some(id))
            .map(EntityRef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_round_trip() {
        let mut graph = EntityGraph::new();
        let a = graph.add(Entity::new("Ingredient").with_prop("name", "sage"));
        let b = graph.add(Entity::new("Ingredient").with_prop("name", "apple"));

        graph.get_mut(a).push_link("pairings", RelLink::to(b));
        graph.get_mut(b).push_link("pairings", RelLink::to(a));

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(a).relation("pairings").unwrap().links()[0].target, b);
        assert_eq!(graph.get(b).relation("pairings").unwrap().links()[0].target, a);
    }

    #[test]
    fn unresolved_distinct_from_empty() {
        let mut e = Entity::new("Recipe");
        assert_eq!(e.relation("ingredients"), None);

        e.rels.insert("ingredients".into(), RelSlot::Unresolved);
        assert!(!e.relation("ingredients").unwrap().is_resolved());

        e.resolve("ingredients", vec![]);
        assert!(e.relation("ingredients").unwrap().is_resolved());
        assert!(e.relation("ingredients").unwrap().links().is_empty());
    }

    #[test]
    fn remove_links_only_touches_resolved() {
        let mut graph = EntityGraph::new();
        let a = graph.add(Entity::new("Ingredient"));
        let b = graph.add(Entity::new("Ingredient"));

        graph.get_mut(a).push_link("pairings", RelLink::to(b));
        assert_eq!(graph.get_mut(a).remove_links_to("pairings", b), 1);
        assert!(graph.get(a).relation("pairings").unwrap().links().is_empty());

        graph.get_mut(b).rels.insert("pairings".into(), RelSlot::Unresolved);
        assert_eq!(graph.get_mut(b).remove_links_to("pairings", a), 0);
        assert!(!graph.get(b).relation("pairings").unwrap().is_resolved());
    }
}
