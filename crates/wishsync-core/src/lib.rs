//! Offline synchronization core for wishlist sharing.
//!
//! Mutations made while offline are applied to local state immediately
//! and recorded in a durable SQLite-backed action queue. When
//! connectivity returns, the replay engine drains the queue against the
//! server in order, detecting field-level conflicts against each
//! action's captured pre-image and pausing the affected entity until
//! the user picks the local or the server version.
//!
//! The pieces compose as: [`SyncQueueManager`] owns the durable queue,
//! [`ReplayEngine`] drains it through a [`RemoteBackend`], the
//! [`ResolutionMediator`] rendezvouses conflicts with decisions, and
//! [`SyncService`] wires it all together for the embedding application.

pub mod backend;
pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod models;
pub mod queue;
pub mod replay;
pub mod service;
pub mod util;

pub use backend::{HttpBackend, RemoteBackend, RemoteError, RemoteResult};
pub use config::SyncSettings;
pub use conflict::{check_divergence, resolve_conflict, ResolutionMediator};
pub use db::Database;
pub use error::{Error, Result};
pub use models::{
    ActionId, ActionKind, ActionPayload, ActionStatus, Entity, EntityKind, EntityRef, FieldMap,
    OfflineAction, ResolutionStrategy, SyncConflict,
};
pub use queue::{EnqueueOutcome, QueueEvent, SyncQueueManager};
pub use replay::{
    Connectivity, DrainOutcome, DrainReason, DrainScheduler, DrainSignal, DrainSummary,
    ReplayEngine,
};
pub use service::SyncService;
