//! Sync queue manager
//!
//! The single in-process writer for the durable queue store. All
//! storage mutation funnels through one mutex so that no two
//! enqueue/remove/update calls interleave at the storage-operation
//! granularity, even though the surrounding drain logic is
//! asynchronous. An in-memory mirror answers UI reads ("is there a
//! pending action for entity X") without touching SQLite.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::db::{ActionStore, Database, SqliteActionStore};
use crate::error::{Error, Result};
use crate::models::{
    ActionId, ActionKind, ActionPayload, ActionStatus, EntityRef, FieldMap, OfflineAction,
};
use crate::util::unix_timestamp_ms;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Queue-changed notification fired after every enqueue, commit,
/// removal, conflict, and failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    Enqueued(ActionId),
    Committed(ActionId),
    Removed(ActionId),
    Conflicted(ActionId),
    Failed(ActionId),
}

/// Result of an enqueue request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The action was appended to the queue
    Enqueued(OfflineAction),
    /// The action exactly inverted a still-pending toggle on the same
    /// entity; both cancelled out locally and nothing was appended
    CancelledOut { removed: ActionId },
}

struct Inner {
    db: Database,
    mirror: Vec<OfflineAction>,
}

/// Owner of the durable queue store and its in-memory mirror
pub struct SyncQueueManager {
    inner: Mutex<Inner>,
    events: broadcast::Sender<QueueEvent>,
}

impl SyncQueueManager {
    /// Load the queue from the store. `IN_FLIGHT` leftovers from a
    /// crash mid-drain are normalized back to `PENDING` here.
    pub fn new(db: Database) -> Result<Self> {
        let (reset, mirror) = {
            let store = SqliteActionStore::new(db.connection());
            (store.reset_in_flight()?, store.get_all()?)
        };
        if reset > 0 {
            tracing::info!(reset, "reset in-flight actions to pending after restart");
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Mutex::new(Inner { db, mirror }),
            events,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Storage("queue lock poisoned".to_string()))
    }

    fn emit(&self, event: QueueEvent) {
        // No receivers is fine; observers are optional.
        let _ = self.events.send(event);
    }

    /// Subscribe to queue-changed notifications
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Validate and append a new action, or cancel out a pending
    /// inverse toggle. Validation failures are never persisted.
    pub fn enqueue(
        &self,
        kind: ActionKind,
        entity_id: impl Into<String>,
        changes: FieldMap,
        pre_image: Option<FieldMap>,
    ) -> Result<EnqueueOutcome> {
        let entity_id = entity_id.into();
        validate(kind, &entity_id, &changes, pre_image.as_ref())?;

        let mut inner = self.lock()?;

        if let Some(inverse) = kind.inverse() {
            let cancelled = inner
                .mirror
                .iter()
                .find(|action| {
                    action.kind == inverse
                        && action.status == ActionStatus::Pending
                        && action.payload.entity.id == entity_id
                })
                .map(|action| action.id);

            if let Some(removed) = cancelled {
                let store = SqliteActionStore::new(inner.db.connection());
                store.remove(removed)?;
                inner.mirror.retain(|action| action.id != removed);
                drop(inner);

                tracing::debug!(%kind, %removed, "toggle cancelled out a pending inverse action");
                self.emit(QueueEvent::Removed(removed));
                return Ok(EnqueueOutcome::CancelledOut { removed });
            }
        }

        let payload = ActionPayload::new(
            EntityRef::new(kind.entity_kind(), entity_id),
            changes,
            pre_image,
        );
        let store = SqliteActionStore::new(inner.db.connection());
        let action = store.append(kind, &payload, unix_timestamp_ms())?;
        inner.mirror.push(action.clone());
        drop(inner);

        tracing::debug!(%kind, id = %action.id, entity = %action.payload.entity, "enqueued offline action");
        self.emit(QueueEvent::Enqueued(action.id));
        Ok(EnqueueOutcome::Enqueued(action))
    }

    /// Current ordered snapshot of the queue (for badges/indicators)
    pub fn actions(&self) -> Result<Vec<OfflineAction>> {
        Ok(self.lock()?.mirror.clone())
    }

    /// Filtered snapshot of the queue
    pub fn query<F>(&self, predicate: F) -> Result<Vec<OfflineAction>>
    where
        F: Fn(&OfflineAction) -> bool,
    {
        Ok(self
            .lock()?
            .mirror
            .iter()
            .filter(|action| predicate(action))
            .cloned()
            .collect())
    }

    /// Whether an unreplayed action of this kind targets the entity
    pub fn is_pending(&self, kind: ActionKind, entity_id: &str) -> Result<bool> {
        Ok(self.lock()?.mirror.iter().any(|action| {
            action.kind == kind
                && action.payload.entity.id == entity_id
                && matches!(
                    action.status,
                    ActionStatus::Pending | ActionStatus::InFlight
                )
        }))
    }

    /// Whether the entity has an unresolved conflict
    pub fn has_pending_conflicts(&self, entity_id: &str) -> Result<bool> {
        Ok(self.lock()?.mirror.iter().any(|action| {
            action.status == ActionStatus::Conflicted && action.payload.entity.id == entity_id
        }))
    }

    /// Look up a queued action by id
    pub fn find(&self, id: ActionId) -> Result<Option<OfflineAction>> {
        Ok(self
            .lock()?
            .mirror
            .iter()
            .find(|action| action.id == id)
            .cloned())
    }

    /// Number of actions still awaiting replay
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self
            .lock()?
            .mirror
            .iter()
            .filter(|action| action.status == ActionStatus::Pending)
            .count())
    }

    /// FIFO snapshot of `PENDING` actions for one drain pass. Actions
    /// enqueued after the snapshot wait for the next pass.
    pub(crate) fn pending_snapshot(&self) -> Result<Vec<OfflineAction>> {
        self.query(|action| action.status == ActionStatus::Pending)
    }

    /// Entities whose branch is paused on an unresolved conflict
    pub(crate) fn conflicted_entities(&self) -> Result<HashSet<EntityRef>> {
        Ok(self
            .lock()?
            .mirror
            .iter()
            .filter(|action| action.status == ActionStatus::Conflicted)
            .map(|action| action.payload.entity.clone())
            .collect())
    }

    fn set_status(&self, id: ActionId, status: ActionStatus) -> Result<()> {
        let mut inner = self.lock()?;
        let store = SqliteActionStore::new(inner.db.connection());
        store.update_status(id, status)?;
        if let Some(action) = inner.mirror.iter_mut().find(|action| action.id == id) {
            action.status = status;
        }
        Ok(())
    }

    pub(crate) fn mark_in_flight(&self, id: ActionId) -> Result<()> {
        self.set_status(id, ActionStatus::InFlight)
    }

    pub(crate) fn mark_pending(&self, id: ActionId) -> Result<()> {
        self.set_status(id, ActionStatus::Pending)
    }

    pub(crate) fn mark_conflicted(&self, id: ActionId) -> Result<()> {
        self.set_status(id, ActionStatus::Conflicted)?;
        self.emit(QueueEvent::Conflicted(id));
        Ok(())
    }

    pub(crate) fn mark_failed(&self, id: ActionId) -> Result<()> {
        self.set_status(id, ActionStatus::Failed)?;
        self.emit(QueueEvent::Failed(id));
        Ok(())
    }

    fn delete(&self, id: ActionId) -> Result<()> {
        let mut inner = self.lock()?;
        let store = SqliteActionStore::new(inner.db.connection());
        store.remove(id)?;
        inner.mirror.retain(|action| action.id != id);
        Ok(())
    }

    /// Remove a successfully replayed action
    pub(crate) fn commit(&self, id: ActionId) -> Result<()> {
        self.delete(id)?;
        self.emit(QueueEvent::Committed(id));
        Ok(())
    }

    /// Remove an action without replaying it (discard)
    pub fn remove(&self, id: ActionId) -> Result<()> {
        self.delete(id)?;
        self.emit(QueueEvent::Removed(id));
        Ok(())
    }
}

fn validate(
    kind: ActionKind,
    entity_id: &str,
    changes: &FieldMap,
    pre_image: Option<&FieldMap>,
) -> Result<()> {
    if entity_id.trim().is_empty() {
        return Err(Error::InvalidAction(
            "entity id must not be empty".to_string(),
        ));
    }

    if kind.is_create() {
        if pre_image.is_some() {
            return Err(Error::InvalidAction(format!(
                "{kind} must not carry a pre-image"
            )));
        }
        if changes.is_empty() {
            return Err(Error::InvalidAction(format!(
                "{kind} requires initial field values"
            )));
        }
    } else if kind.is_delete() {
        if !changes.is_empty() {
            return Err(Error::InvalidAction(format!(
                "{kind} must not carry field changes"
            )));
        }
    } else {
        if changes.is_empty() {
            return Err(Error::InvalidAction(format!(
                "{kind} requires field changes"
            )));
        }
        if pre_image.is_none() {
            return Err(Error::InvalidAction(format!(
                "{kind} requires a pre-image snapshot"
            )));
        }
    }

    Ok(())
}
