//! Offline action model
//!
//! An [`OfflineAction`] is a queued mutation intent: what the user did
//! while offline, captured with enough context to replay it against the
//! server later. Every mutation is an idempotent state-set (never a
//! relative increment), so replaying an action twice after a crash
//! leaves the server in the same state as replaying it once.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::entity::{EntityKind, EntityRef, FieldMap};

/// Locally-assigned monotonic action identifier (SQLite rowid).
///
/// Ordering of ids is the replay order: for two actions targeting the
/// same entity the smaller id is always attempted first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActionId(i64);

impl ActionId {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of mutation kinds the queue accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    ClaimItem,
    UnclaimItem,
    CreateItem,
    UpdateItem,
    DeleteItem,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
    UpdateWishlist,
}

impl ActionKind {
    /// All accepted kinds, in declaration order
    pub const ALL: [Self; 9] = [
        Self::ClaimItem,
        Self::UnclaimItem,
        Self::CreateItem,
        Self::UpdateItem,
        Self::DeleteItem,
        Self::CreateCategory,
        Self::UpdateCategory,
        Self::DeleteCategory,
        Self::UpdateWishlist,
    ];

    /// Wire/storage name of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClaimItem => "CLAIM_ITEM",
            Self::UnclaimItem => "UNCLAIM_ITEM",
            Self::CreateItem => "CREATE_ITEM",
            Self::UpdateItem => "UPDATE_ITEM",
            Self::DeleteItem => "DELETE_ITEM",
            Self::CreateCategory => "CREATE_CATEGORY",
            Self::UpdateCategory => "UPDATE_CATEGORY",
            Self::DeleteCategory => "DELETE_CATEGORY",
            Self::UpdateWishlist => "UPDATE_WISHLIST",
        }
    }

    /// Parse a wire/storage name back into a kind
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// The entity kind this action targets
    #[must_use]
    pub const fn entity_kind(self) -> EntityKind {
        match self {
            Self::ClaimItem
            | Self::UnclaimItem
            | Self::CreateItem
            | Self::UpdateItem
            | Self::DeleteItem => EntityKind::Item,
            Self::CreateCategory | Self::UpdateCategory | Self::DeleteCategory => {
                EntityKind::Category
            }
            Self::UpdateWishlist => EntityKind::Wishlist,
        }
    }

    /// The toggle that exactly undoes this one, if any.
    ///
    /// Enqueueing the inverse of a still-pending toggle cancels both
    /// out locally instead of replaying a net no-op pair.
    #[must_use]
    pub const fn inverse(self) -> Option<Self> {
        match self {
            Self::ClaimItem => Some(Self::UnclaimItem),
            Self::UnclaimItem => Some(Self::ClaimItem),
            _ => None,
        }
    }

    /// Pure creates skip the pre-flight fetch: the entity id is minted
    /// on this client, so there is no server state to diverge from.
    #[must_use]
    pub const fn is_create(self) -> bool {
        matches!(self, Self::CreateItem | Self::CreateCategory)
    }

    #[must_use]
    pub const fn is_delete(self) -> bool {
        matches!(self, Self::DeleteItem | Self::DeleteCategory)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replay status of a queued action.
///
/// `InFlight` is never trusted across a restart: the store normalizes
/// it back to `Pending` on load because the engine cannot know whether
/// the in-flight request completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    InFlight,
    Conflicted,
    Failed,
}

impl ActionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InFlight => "IN_FLIGHT",
            Self::Conflicted => "CONFLICTED",
            Self::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "IN_FLIGHT" => Some(Self::InFlight),
            "CONFLICTED" => Some(Self::Conflicted),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to replay a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPayload {
    /// Target entity
    pub entity: EntityRef,
    /// New field values the mutation sets
    pub changes: FieldMap,
    /// Snapshot of the relevant fields at enqueue time, used for
    /// divergence comparison; absent for pure creates
    pub pre_image: Option<FieldMap>,
}

impl ActionPayload {
    #[must_use]
    pub const fn new(entity: EntityRef, changes: FieldMap, pre_image: Option<FieldMap>) -> Self {
        Self {
            entity,
            changes,
            pre_image,
        }
    }

    /// The client's version of the entity: the pre-image with this
    /// action's changes applied on top.
    #[must_use]
    pub fn local_view(&self) -> FieldMap {
        let mut view = self.pre_image.clone().unwrap_or_default();
        for (field, value) in &self.changes {
            view.insert(field.clone(), value.clone());
        }
        view
    }
}

/// A queued offline mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineAction {
    /// Unique identifier and FIFO ordering key
    pub id: ActionId,
    /// Mutation kind
    pub kind: ActionKind,
    /// Replay payload
    pub payload: ActionPayload,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Replay status
    pub status: ActionStatus,
}

impl OfflineAction {
    /// Whether replay must fetch current server state before
    /// submitting this action
    #[must_use]
    pub const fn needs_preflight(&self) -> bool {
        !self.kind.is_create()
    }

    #[must_use]
    pub fn entity(&self) -> &EntityRef {
        &self.payload.entity
    }
}
