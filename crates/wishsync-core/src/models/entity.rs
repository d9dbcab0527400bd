//! Server-side entity model
//!
//! The sync core treats wishlist items, categories, and lists
//! generically: an entity is a typed identifier plus a flat JSON field
//! map. Divergence detection compares individual fields, so the core
//! never needs the full backend schema.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Flat field map of an entity, as stored in action payloads and
/// returned by the backend.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// The kind of entity an action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    Category,
    Wishlist,
}

impl EntityKind {
    /// URL path segment for the backend API
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Item => "items",
            Self::Category => "categories",
            Self::Wishlist => "wishlists",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Item => "item",
            Self::Category => "category",
            Self::Wishlist => "wishlist",
        })
    }
}

/// Typed reference to a single entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    #[must_use]
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// An entity as fetched from the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity: EntityRef,
    pub fields: FieldMap,
}

impl Entity {
    #[must_use]
    pub const fn new(entity: EntityRef, fields: FieldMap) -> Self {
        Self { entity, fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_are_plural() {
        assert_eq!(EntityKind::Item.path_segment(), "items");
        assert_eq!(EntityKind::Category.path_segment(), "categories");
        assert_eq!(EntityKind::Wishlist.path_segment(), "wishlists");
    }

    #[test]
    fn entity_ref_display() {
        let entity = EntityRef::new(EntityKind::Item, "abc");
        assert_eq!(entity.to_string(), "item/abc");
    }
}
