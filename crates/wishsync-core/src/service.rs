//! Sync service facade
//!
//! Wires the queue, replay engine, conflict mediator, and drain
//! triggers into one handle the embedding application holds. The
//! returned [`DrainScheduler`] must be spawned on the runtime; the
//! conflict receiver is the stream the UI listens on.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::{HttpBackend, RemoteBackend};
use crate::config::SyncSettings;
use crate::conflict::ResolutionMediator;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    ActionId, ActionKind, ActionStatus, FieldMap, OfflineAction, ResolutionStrategy, SyncConflict,
};
use crate::queue::{EnqueueOutcome, SyncQueueManager};
use crate::replay::{
    apply_resolution, Connectivity, DrainOutcome, DrainReason, DrainScheduler, DrainSignal,
    ReplayEngine,
};

/// Application-facing handle over the offline sync core
pub struct SyncService {
    queue: Arc<SyncQueueManager>,
    engine: Arc<ReplayEngine>,
    mediator: Arc<ResolutionMediator>,
    backend: Arc<dyn RemoteBackend>,
    connectivity: Connectivity,
    signal: DrainSignal,
}

impl SyncService {
    /// Build the service against the HTTP backend from `settings`.
    ///
    /// Connectivity starts offline; the platform reports the real state
    /// through [`SyncService::connectivity`], and the offline -> online
    /// edge triggers the first drain.
    pub fn new(
        db: Database,
        settings: &SyncSettings,
    ) -> Result<(Self, DrainScheduler, mpsc::UnboundedReceiver<SyncConflict>)> {
        let backend: Arc<dyn RemoteBackend> = Arc::new(HttpBackend::new(settings)?);
        Self::with_backend(db, backend, settings)
    }

    /// Build the service against any backend implementation
    pub fn with_backend(
        db: Database,
        backend: Arc<dyn RemoteBackend>,
        settings: &SyncSettings,
    ) -> Result<(Self, DrainScheduler, mpsc::UnboundedReceiver<SyncConflict>)> {
        let queue = Arc::new(SyncQueueManager::new(db)?);
        let (mediator, surfaced) = ResolutionMediator::new();
        let mediator = Arc::new(mediator);
        let (signal, requests) = DrainSignal::new();
        let connectivity = Connectivity::new(false);

        let engine = Arc::new(ReplayEngine::new(
            Arc::clone(&queue),
            Arc::clone(&backend),
            Arc::clone(&mediator),
            signal.clone(),
            settings,
        ));

        let scheduler = DrainScheduler::new(
            Arc::clone(&engine),
            requests,
            connectivity.subscribe(),
            settings.poll_interval,
        );

        let service = Self {
            queue,
            engine,
            mediator,
            backend,
            connectivity,
            signal,
        };
        Ok((service, scheduler, surfaced))
    }

    /// The underlying queue, for reads and event subscription
    #[must_use]
    pub fn queue(&self) -> &SyncQueueManager {
        &self.queue
    }

    /// Online/offline reporting handle
    #[must_use]
    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Record a local mutation and nudge the drain if we are online.
    ///
    /// The local apply (updating the app's own store) already happened
    /// on the caller's side; this persists the action for replay.
    pub fn enqueue(
        &self,
        kind: ActionKind,
        entity_id: impl Into<String>,
        changes: FieldMap,
        pre_image: Option<FieldMap>,
    ) -> Result<EnqueueOutcome> {
        let outcome = self.queue.enqueue(kind, entity_id, changes, pre_image)?;
        if self.connectivity.is_online() {
            self.signal.request(DrainReason::Manual);
        }
        Ok(outcome)
    }

    /// Ask for a drain from a platform sync event
    pub fn request_sync(&self) {
        self.signal.request(DrainReason::SyncRequest);
    }

    /// Run a drain pass right now, bypassing the scheduler
    pub async fn drain_now(&self) -> Result<DrainOutcome> {
        self.engine.try_drain().await
    }

    /// Actions currently blocked on an unresolved conflict
    pub fn conflicts(&self) -> Result<Vec<OfflineAction>> {
        self.queue
            .query(|action| action.status == ActionStatus::Conflicted)
    }

    /// Apply a decision for a conflicted action.
    ///
    /// A live resolution waiter (parked by the current process's drain)
    /// gets the decision through the mediator. Without one, for example
    /// after a restart, the decision is applied directly.
    pub async fn resolve(&self, action_id: ActionId, strategy: ResolutionStrategy) -> Result<()> {
        if self.mediator.has_pending(action_id) {
            return self.mediator.resolve(action_id, strategy);
        }

        let action = self
            .queue
            .find(action_id)?
            .ok_or_else(|| Error::NotFound(format!("action {action_id} is not queued")))?;
        if action.status != ActionStatus::Conflicted {
            return Err(Error::Resolution(format!(
                "action {action_id} is not conflicted"
            )));
        }

        apply_resolution(
            &self.queue,
            self.backend.as_ref(),
            &self.signal,
            &action,
            strategy,
        )
        .await
    }
}
