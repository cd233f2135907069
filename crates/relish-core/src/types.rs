//! Sort, pagination, direction, and traversal-depth descriptors.

use serde::{Deserialize, Serialize};

/// Direction of a relationship as seen from the declaring entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    Undirected,
}

/// Sort direction for query-level ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// A query-level sort descriptor over one persisted property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub property: String,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// A query-level pagination window (zero-based page number).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self { number, size }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number) * u64::from(self.size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }
}

/// The persistence horizon: how many relationship hops to traverse from a
/// root entity during load.
///
/// `Hops(0)` loads scalar properties only; neighbors beyond the horizon stay
/// [`crate::RelSlot::Unresolved`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Hops(u32),
    Unbounded,
}

impl Depth {
    /// Whether traversal may expand a frontier at `hop` hops from the root.
    pub fn allows(&self, hop: u32) -> bool {
        match self {
            Depth::Hops(n) => hop < *n,
            Depth::Unbounded => true,
        }
    }
}

impl Default for Depth {
    fn default() -> Self {
        Depth::Hops(1)
    }
}
