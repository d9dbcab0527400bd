//! Data models for the sync core

pub mod action;
pub mod conflict;
pub mod entity;

pub use action::{ActionId, ActionKind, ActionPayload, ActionStatus, OfflineAction};
pub use conflict::{resolve_conflict, ResolutionStrategy, SyncConflict};
pub use entity::{Entity, EntityKind, EntityRef, FieldMap};
