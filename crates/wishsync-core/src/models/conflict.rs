//! Sync conflict model
//!
//! A [`SyncConflict`] is created when replay detects that the server's
//! copy of an entity diverged from the pre-image a queued action
//! captured. It is surfaced to a human exactly once and discarded after
//! the decision is applied; conflicts are never persisted.

use serde::{Deserialize, Serialize};

use super::action::ActionId;
use super::entity::{EntityRef, FieldMap};

/// User decision between the two versions of a conflicted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategy {
    /// Keep the server's version; discard the queued action
    Server,
    /// Keep the local version; re-apply the queued action unconditionally
    Local,
}

/// A detected divergence awaiting a user decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// The queued action that triggered detection (relation, not ownership)
    pub action_id: ActionId,
    /// Target entity
    pub entity: EntityRef,
    /// The client's version of the entity (pre-image plus the action's changes)
    pub local_data: FieldMap,
    /// The server's current version; empty when the entity no longer
    /// exists remotely
    pub server_data: FieldMap,
    /// Whether a decision has been recorded
    pub resolved: bool,
}

impl SyncConflict {
    #[must_use]
    pub const fn new(
        action_id: ActionId,
        entity: EntityRef,
        local_data: FieldMap,
        server_data: FieldMap,
    ) -> Self {
        Self {
            action_id,
            entity,
            local_data,
            server_data,
            resolved: false,
        }
    }

    pub fn mark_resolved(&mut self) {
        self.resolved = true;
    }
}

/// Pick the winning version for a strategy.
///
/// Pure: performs no I/O and mutates nothing; callers apply or discard
/// based on the returned value.
#[must_use]
pub fn resolve_conflict(conflict: &SyncConflict, strategy: ResolutionStrategy) -> &FieldMap {
    match strategy {
        ResolutionStrategy::Server => &conflict.server_data,
        ResolutionStrategy::Local => &conflict.local_data,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::entity::EntityKind;

    fn sample_conflict() -> SyncConflict {
        let mut local = FieldMap::new();
        local.insert("name".to_string(), json!("B"));
        let mut server = FieldMap::new();
        server.insert("name".to_string(), json!("C"));
        SyncConflict::new(
            ActionId::new(7),
            EntityRef::new(EntityKind::Item, "i-1"),
            local,
            server,
        )
    }

    #[test]
    fn resolve_returns_exact_sides() {
        let conflict = sample_conflict();
        assert_eq!(
            resolve_conflict(&conflict, ResolutionStrategy::Server),
            &conflict.server_data
        );
        assert_eq!(
            resolve_conflict(&conflict, ResolutionStrategy::Local),
            &conflict.local_data
        );
    }

    #[test]
    fn resolve_does_not_mutate_input() {
        let conflict = sample_conflict();
        let before = conflict.clone();
        let _ = resolve_conflict(&conflict, ResolutionStrategy::Server);
        let _ = resolve_conflict(&conflict, ResolutionStrategy::Local);
        assert_eq!(conflict, before);
    }

    #[test]
    fn new_conflict_starts_unresolved() {
        let mut conflict = sample_conflict();
        assert!(!conflict.resolved);
        conflict.mark_resolved();
        assert!(conflict.resolved);
    }
}
