//! Conflict resolution service
//!
//! Divergence detection compares an action's captured pre-image against
//! the freshly fetched server entity, field by field, restricted to the
//! fields the action actually touches. Whole-object equality would
//! raise false conflicts from unrelated concurrent edits.
//!
//! Detected conflicts go through the [`ResolutionMediator`]: a
//! rendezvous where the replay side parks until exactly one
//! `resolve` call supplies a [`ResolutionStrategy`]. Double resolution
//! is rejected.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::models::{ActionId, Entity, FieldMap, OfflineAction, ResolutionStrategy, SyncConflict};

pub use crate::models::resolve_conflict;

/// Compare an action's pre-image with the fetched server state.
///
/// Returns a [`SyncConflict`] when any field the action touches differs
/// between the pre-image and the server's current value. `server` is
/// `None` when the entity no longer exists remotely; that counts as
/// divergence for everything except deletes (the engine commits those
/// as already applied before calling here).
#[must_use]
pub fn check_divergence(action: &OfflineAction, server: Option<&Entity>) -> Option<SyncConflict> {
    let pre_image = action.payload.pre_image.as_ref()?;

    let Some(entity) = server else {
        if action.kind.is_delete() {
            return None;
        }
        return Some(build_conflict(action, FieldMap::new()));
    };

    // Deletes touch no fields of their own; the captured pre-image is
    // what the user believed they were deleting.
    let relevant: Vec<&String> = if action.kind.is_delete() {
        pre_image.keys().collect()
    } else {
        action.payload.changes.keys().collect()
    };

    let divergent = relevant
        .into_iter()
        .any(|field| pre_image.get(field) != entity.fields.get(field));

    if divergent {
        Some(build_conflict(action, entity.fields.clone()))
    } else {
        None
    }
}

fn build_conflict(action: &OfflineAction, server_data: FieldMap) -> SyncConflict {
    SyncConflict::new(
        action.id,
        action.payload.entity.clone(),
        action.payload.local_view(),
        server_data,
    )
}

/// Rendezvous between replay (which detects conflicts) and the UI
/// (which supplies decisions).
///
/// `request_resolution` registers a single-shot slot keyed by action id
/// and surfaces the conflict on the stream handed out at construction;
/// it then waits until `resolve` fires for that id. A second `resolve`
/// for the same id, or one for an unknown id, returns an error.
pub struct ResolutionMediator {
    pending: Mutex<HashMap<ActionId, oneshot::Sender<ResolutionStrategy>>>,
    surface_tx: mpsc::UnboundedSender<SyncConflict>,
}

impl ResolutionMediator {
    /// Create the mediator and the stream of surfaced conflicts
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncConflict>) {
        let (surface_tx, surface_rx) = mpsc::unbounded_channel();
        (
            Self {
                pending: Mutex::new(HashMap::new()),
                surface_tx,
            },
            surface_rx,
        )
    }

    fn pending_lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ActionId, oneshot::Sender<ResolutionStrategy>>>>
    {
        self.pending
            .lock()
            .map_err(|_| Error::Resolution("mediator lock poisoned".to_string()))
    }

    /// Surface a conflict and wait for its decision
    pub async fn request_resolution(&self, conflict: SyncConflict) -> Result<ResolutionStrategy> {
        let action_id = conflict.action_id;
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending_lock()?;
            if pending.contains_key(&action_id) {
                return Err(Error::Resolution(format!(
                    "action {action_id} is already awaiting resolution"
                )));
            }
            pending.insert(action_id, tx);
        }

        // Observers may be gone (e.g. headless drain); the decision can
        // still arrive through resolve().
        let _ = self.surface_tx.send(conflict);

        rx.await
            .map_err(|_| Error::Resolution("resolution channel closed".to_string()))
    }

    /// Supply the decision for a surfaced conflict. Exactly one call
    /// per conflict succeeds.
    pub fn resolve(&self, action_id: ActionId, strategy: ResolutionStrategy) -> Result<()> {
        let sender = self
            .pending_lock()?
            .remove(&action_id)
            .ok_or_else(|| {
                Error::Resolution(format!("no pending resolution for action {action_id}"))
            })?;

        sender
            .send(strategy)
            .map_err(|_| Error::Resolution("resolution consumer dropped".to_string()))
    }

    /// Whether a conflict for this action is awaiting a decision
    pub fn has_pending(&self, action_id: ActionId) -> bool {
        self.pending_lock()
            .map(|pending| pending.contains_key(&action_id))
            .unwrap_or(false)
    }
}
