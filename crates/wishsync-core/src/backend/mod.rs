//! Remote backend contract
//!
//! The sync core talks to the server through this narrow port: fetch an
//! entity's current state, submit one mutation. Errors are classified
//! at this boundary so the replay engine only has to distinguish
//! "retry later" from "the server said no".

mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Entity, EntityRef, OfflineAction};

pub use http::HttpBackend;

/// Errors crossing the backend boundary
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Retryable: network unreachable, timeout, or server overload.
    /// The drain pauses and backs off.
    #[error("Transient network error: {0}")]
    Transient(String),

    /// The server refused the mutation (it saw a conflict or rejected
    /// the payload). Not retryable as-is; surfaced as a conflict.
    #[error("Mutation rejected by server: {0}")]
    Rejected(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Abstract server the queue replays against
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Current server state of an entity; `None` when it does not exist
    async fn fetch_entity(&self, entity: &EntityRef) -> RemoteResult<Option<Entity>>;

    /// Apply one mutation. Mutations are idempotent state-sets, so a
    /// duplicate submit after a crash must leave the entity unchanged.
    async fn submit_mutation(&self, action: &OfflineAction) -> RemoteResult<()>;
}
