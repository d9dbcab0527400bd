//! Replay engine
//!
//! Drains the durable action queue against the remote backend. A drain
//! pass walks a snapshot of pending actions in queue order; actions
//! enqueued mid-pass wait for the next one. At most one pass runs at a
//! time, guarded by a `try_lock` on the drain gate, so concurrent
//! triggers collapse into a single replay.
//!
//! Per action: optionally preflight the server's current entity state,
//! run field-level divergence detection, then submit. A transient
//! failure pauses the whole drain and schedules a backoff retry; a
//! conflict blocks only that entity's branch so unrelated entities keep
//! flowing.

mod triggers;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::backend::{RemoteBackend, RemoteError};
use crate::config::SyncSettings;
use crate::conflict::{check_divergence, ResolutionMediator};
use crate::error::{Error, Result};
use crate::models::{FieldMap, OfflineAction, ResolutionStrategy, SyncConflict};
use crate::queue::SyncQueueManager;

pub use triggers::{Connectivity, DrainReason, DrainScheduler, DrainSignal};

/// What one drain pass accomplished
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Actions acknowledged and removed from the queue
    pub committed: usize,
    /// Actions that diverged and now await a decision
    pub conflicted: usize,
    /// Actions skipped because their entity's branch is blocked
    pub skipped: usize,
    /// Actions still queued after the pass, in any state
    pub remaining: usize,
    /// The pass stopped early on a transient failure
    pub stopped_on_transient: bool,
}

/// Result of asking for a drain
#[derive(Debug)]
pub enum DrainOutcome {
    /// This call ran the pass
    Completed(DrainSummary),
    /// Another pass held the gate; its pass covers the queued work
    AlreadyRunning,
}

/// Replays queued actions against the remote backend
pub struct ReplayEngine {
    queue: Arc<SyncQueueManager>,
    backend: Arc<dyn RemoteBackend>,
    mediator: Arc<ResolutionMediator>,
    signal: DrainSignal,
    drain_gate: AsyncMutex<()>,
    consecutive_failures: AtomicU32,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
}

impl ReplayEngine {
    #[must_use]
    pub fn new(
        queue: Arc<SyncQueueManager>,
        backend: Arc<dyn RemoteBackend>,
        mediator: Arc<ResolutionMediator>,
        signal: DrainSignal,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            queue,
            backend,
            mediator,
            signal,
            drain_gate: AsyncMutex::new(()),
            consecutive_failures: AtomicU32::new(0),
            retry_base_delay: settings.retry_base_delay,
            retry_max_delay: settings.retry_max_delay,
        }
    }

    /// Whether any action is waiting to be replayed
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.queue.pending_count().is_ok_and(|count| count > 0)
    }

    /// Run one drain pass, unless a pass is already running.
    ///
    /// The gate makes this safe to call from every trigger at once: the
    /// losing callers return [`DrainOutcome::AlreadyRunning`] without
    /// touching the queue.
    pub async fn try_drain(self: &Arc<Self>) -> Result<DrainOutcome> {
        let Ok(_guard) = self.drain_gate.try_lock() else {
            return Ok(DrainOutcome::AlreadyRunning);
        };
        let summary = self.run_pass().await?;
        Ok(DrainOutcome::Completed(summary))
    }

    async fn run_pass(self: &Arc<Self>) -> Result<DrainSummary> {
        let pending = self.queue.pending_snapshot()?;
        let mut blocked = self.queue.conflicted_entities()?;
        let mut summary = DrainSummary::default();

        tracing::debug!(
            pending = pending.len(),
            blocked = blocked.len(),
            "drain pass started"
        );

        for action in pending {
            if blocked.contains(action.entity()) {
                summary.skipped += 1;
                continue;
            }

            // Enqueues run concurrently with the pass, and a toggle
            // cancellation may have removed this snapshot entry already.
            match self.queue.mark_in_flight(action.id) {
                Ok(()) => {}
                Err(Error::NotFound(_)) => {
                    tracing::debug!(id = %action.id, "action removed since snapshot; skipping");
                    summary.skipped += 1;
                    continue;
                }
                Err(error) => return Err(error),
            }

            let server = if action.needs_preflight() {
                match self.backend.fetch_entity(action.entity()).await {
                    Ok(server) => server,
                    Err(error) => {
                        // Whether the fetch timed out or was refused,
                        // nothing useful can happen without a server
                        // snapshot. Pause and retry later.
                        tracing::warn!(id = %action.id, %error, "preflight fetch failed");
                        self.queue.mark_pending(action.id)?;
                        self.schedule_retry();
                        summary.stopped_on_transient = true;
                        break;
                    }
                }
            } else {
                None
            };

            // A delete whose target is already gone remotely has
            // nothing left to do.
            if action.needs_preflight() && action.kind.is_delete() && server.is_none() {
                tracing::debug!(id = %action.id, entity = %action.entity(), "delete target already gone");
                self.queue.commit(action.id)?;
                summary.committed += 1;
                continue;
            }

            if let Some(conflict) = check_divergence(&action, server.as_ref()) {
                tracing::info!(id = %action.id, entity = %action.entity(), "divergence detected");
                self.block_on_conflict(&action, conflict, &mut blocked)?;
                summary.conflicted += 1;
                continue;
            }

            match self.backend.submit_mutation(&action).await {
                Ok(()) => {
                    self.queue.commit(action.id)?;
                    summary.committed += 1;
                }
                Err(RemoteError::Transient(reason)) => {
                    tracing::warn!(id = %action.id, %reason, "transient failure; pausing drain");
                    self.queue.mark_pending(action.id)?;
                    self.schedule_retry();
                    summary.stopped_on_transient = true;
                    break;
                }
                Err(RemoteError::Rejected(reason)) => {
                    // The server saw something our preflight did not.
                    // Re-fetch for the freshest server side of the
                    // conflict; an empty map is still presentable.
                    tracing::warn!(id = %action.id, %reason, "server rejected mutation");
                    let server_data = match self.backend.fetch_entity(action.entity()).await {
                        Ok(Some(entity)) => entity.fields,
                        _ => FieldMap::new(),
                    };
                    let conflict = SyncConflict::new(
                        action.id,
                        action.entity().clone(),
                        action.payload.local_view(),
                        server_data,
                    );
                    self.block_on_conflict(&action, conflict, &mut blocked)?;
                    summary.conflicted += 1;
                }
            }
        }

        if !summary.stopped_on_transient {
            self.consecutive_failures.store(0, Ordering::Relaxed);
        }

        summary.remaining = self.queue.actions()?.len();
        tracing::debug!(
            committed = summary.committed,
            conflicted = summary.conflicted,
            skipped = summary.skipped,
            remaining = summary.remaining,
            "drain pass finished"
        );
        Ok(summary)
    }

    fn block_on_conflict(
        self: &Arc<Self>,
        action: &OfflineAction,
        conflict: SyncConflict,
        blocked: &mut HashSet<crate::models::EntityRef>,
    ) -> Result<()> {
        self.queue.mark_conflicted(action.id)?;
        blocked.insert(action.entity().clone());
        self.spawn_resolution(conflict);
        Ok(())
    }

    /// Park a task on the mediator until a decision arrives, then apply
    /// it and wake the drain.
    fn spawn_resolution(self: &Arc<Self>, conflict: SyncConflict) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let action_id = conflict.action_id;
            let strategy = match engine.mediator.request_resolution(conflict).await {
                Ok(strategy) => strategy,
                Err(error) => {
                    tracing::debug!(%action_id, %error, "resolution request abandoned");
                    return;
                }
            };

            match engine.queue.find(action_id) {
                Ok(Some(action)) => {
                    if let Err(error) = apply_resolution(
                        &engine.queue,
                        engine.backend.as_ref(),
                        &engine.signal,
                        &action,
                        strategy,
                    )
                    .await
                    {
                        tracing::warn!(%action_id, %error, "failed to apply resolution");
                    }
                }
                Ok(None) => {
                    tracing::debug!(%action_id, "conflicted action vanished before resolution");
                }
                Err(error) => {
                    tracing::warn!(%action_id, %error, "could not load conflicted action");
                }
            }
        });
    }

    fn schedule_retry(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        let exponential = self
            .retry_base_delay
            .saturating_mul(2_u32.saturating_pow(failures.min(16)));
        let delay = exponential.min(self.retry_max_delay);

        tracing::debug!(?delay, failures = failures + 1, "scheduling drain retry");

        let signal = self.signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            signal.request(DrainReason::Retry);
        });
    }
}

/// Apply a resolution decision to a conflicted action.
///
/// `Server` discards the local action; `Local` re-submits it
/// unconditionally. Either way the entity's branch unblocks and the
/// drain is woken to pick up anything that was waiting behind it.
pub(crate) async fn apply_resolution(
    queue: &SyncQueueManager,
    backend: &dyn RemoteBackend,
    signal: &DrainSignal,
    action: &OfflineAction,
    strategy: ResolutionStrategy,
) -> Result<()> {
    match strategy {
        ResolutionStrategy::Server => {
            queue.remove(action.id)?;
            tracing::info!(id = %action.id, "conflict resolved: server version kept");
        }
        ResolutionStrategy::Local => match backend.submit_mutation(action).await {
            Ok(()) => {
                queue.commit(action.id)?;
                tracing::info!(id = %action.id, "conflict resolved: local version re-applied");
            }
            Err(RemoteError::Transient(reason)) => {
                // Back to pending; the next drain retries the submit.
                // If the server still diverges by then the conflict
                // surfaces again, which beats losing the decision.
                tracing::warn!(id = %action.id, %reason, "transient failure re-applying local version");
                queue.mark_pending(action.id)?;
            }
            Err(RemoteError::Rejected(reason)) => {
                tracing::warn!(id = %action.id, %reason, "server rejected re-applied local version");
                queue.mark_failed(action.id)?;
            }
        },
    }

    signal.request(DrainReason::Resume);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::backend::RemoteResult;
    use crate::db::Database;
    use crate::models::{ActionKind, ActionStatus, Entity, EntityKind, EntityRef};

    /// In-memory backend with per-entity server state, a submit log,
    /// and one-shot failure injection.
    struct MockBackend {
        entities: Mutex<HashMap<EntityRef, FieldMap>>,
        submitted: Mutex<Vec<ActionKind>>,
        fail_submits: Mutex<Vec<RemoteError>>,
        submit_delay: Option<Duration>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                entities: Mutex::new(HashMap::new()),
                submitted: Mutex::new(Vec::new()),
                fail_submits: Mutex::new(Vec::new()),
                submit_delay: None,
            }
        }

        fn with_entity(self, entity: EntityRef, fields: FieldMap) -> Self {
            self.entities.lock().unwrap().insert(entity, fields);
            self
        }

        fn with_submit_failure(self, error: RemoteError) -> Self {
            self.fail_submits.lock().unwrap().push(error);
            self
        }

        fn submitted_kinds(&self) -> Vec<ActionKind> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl RemoteBackend for MockBackend {
        async fn fetch_entity(&self, entity: &EntityRef) -> RemoteResult<Option<Entity>> {
            let fields = self.entities.lock().unwrap().get(entity).cloned();
            Ok(fields.map(|fields| Entity::new(entity.clone(), fields)))
        }

        async fn submit_mutation(&self, action: &OfflineAction) -> RemoteResult<()> {
            if let Some(delay) = self.submit_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = self.fail_submits.lock().unwrap().pop() {
                return Err(error);
            }
            self.submitted.lock().unwrap().push(action.kind);
            Ok(())
        }
    }

    fn field_map(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    struct Harness {
        engine: Arc<ReplayEngine>,
        queue: Arc<SyncQueueManager>,
        mediator: Arc<ResolutionMediator>,
        surfaced: tokio::sync::mpsc::UnboundedReceiver<SyncConflict>,
        backend: Arc<MockBackend>,
    }

    fn harness(backend: MockBackend) -> Harness {
        let db = Database::open_in_memory().unwrap();
        let queue = Arc::new(SyncQueueManager::new(db).unwrap());
        let (mediator, surfaced) = ResolutionMediator::new();
        let mediator = Arc::new(mediator);
        let (signal, _requests) = DrainSignal::new();
        let backend = Arc::new(backend);
        let engine = Arc::new(ReplayEngine::new(
            Arc::clone(&queue),
            Arc::clone(&backend) as Arc<dyn RemoteBackend>,
            Arc::clone(&mediator),
            signal,
            &SyncSettings::default(),
        ));
        Harness {
            engine,
            queue,
            mediator,
            surfaced,
            backend,
        }
    }

    fn summary(outcome: DrainOutcome) -> DrainSummary {
        match outcome {
            DrainOutcome::Completed(summary) => summary,
            DrainOutcome::AlreadyRunning => panic!("expected a completed pass"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drains_matching_actions_in_order() {
        let item = EntityRef::new(EntityKind::Item, "i-1");
        let backend = MockBackend::new()
            .with_entity(item.clone(), field_map(&[("claimed_by", json!(null))]));
        let h = harness(backend);

        h.queue
            .enqueue(
                ActionKind::CreateItem,
                "i-9",
                field_map(&[("name", json!("scarf"))]),
                None,
            )
            .unwrap();
        h.queue
            .enqueue(
                ActionKind::ClaimItem,
                "i-1",
                field_map(&[("claimed_by", json!("ana"))]),
                Some(field_map(&[("claimed_by", json!(null))])),
            )
            .unwrap();

        let summary = summary(h.engine.try_drain().await.unwrap());
        assert_eq!(summary.committed, 2);
        assert_eq!(summary.remaining, 0);
        assert!(!summary.stopped_on_transient);
        assert!(h.queue.actions().unwrap().is_empty());
        assert_eq!(
            h.backend.submitted_kinds(),
            vec![ActionKind::CreateItem, ActionKind::ClaimItem]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_drains_collapse_to_one() {
        let backend = MockBackend {
            submit_delay: Some(Duration::from_millis(50)),
            ..MockBackend::new()
        };
        let h = harness(backend);

        h.queue
            .enqueue(
                ActionKind::CreateItem,
                "i-1",
                field_map(&[("name", json!("book"))]),
                None,
            )
            .unwrap();

        let (first, second) = tokio::join!(h.engine.try_drain(), {
            let engine = Arc::clone(&h.engine);
            async move {
                // Give the first caller a head start into the slow submit.
                tokio::time::sleep(Duration::from_millis(10)).await;
                engine.try_drain().await
            }
        });

        let outcomes = [first.unwrap(), second.unwrap()];
        let completed = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, DrainOutcome::Completed(_)))
            .count();
        let rejected = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, DrainOutcome::AlreadyRunning))
            .count();
        assert_eq!(completed, 1);
        assert_eq!(rejected, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failure_pauses_and_preserves_order() {
        let backend = MockBackend::new()
            .with_submit_failure(RemoteError::Transient("connection reset".to_string()));
        let h = harness(backend);

        let first = h
            .queue
            .enqueue(
                ActionKind::CreateItem,
                "i-1",
                field_map(&[("name", json!("one"))]),
                None,
            )
            .unwrap();
        h.queue
            .enqueue(
                ActionKind::CreateItem,
                "i-2",
                field_map(&[("name", json!("two"))]),
                None,
            )
            .unwrap();

        let summary = summary(h.engine.try_drain().await.unwrap());
        assert!(summary.stopped_on_transient);
        assert_eq!(summary.committed, 0);
        assert_eq!(summary.remaining, 2);

        // The failed action is pending again, still first in line.
        let actions = h.queue.actions().unwrap();
        let first_id = match first {
            crate::queue::EnqueueOutcome::Enqueued(action) => action.id,
            crate::queue::EnqueueOutcome::CancelledOut { .. } => unreachable!(),
        };
        assert_eq!(actions[0].id, first_id);
        assert_eq!(actions[0].status, ActionStatus::Pending);

        // Retry succeeds and drains both in order.
        let summary = self::summary(h.engine.try_drain().await.unwrap());
        assert_eq!(summary.committed, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn divergence_blocks_entity_branch_but_not_others() {
        let blocked_item = EntityRef::new(EntityKind::Item, "i-1");
        let backend = MockBackend::new()
            .with_entity(
                blocked_item.clone(),
                field_map(&[("price", json!(99))]),
            )
            .with_entity(
                EntityRef::new(EntityKind::Item, "i-2"),
                field_map(&[("name", json!("kite"))]),
            );
        let mut h = harness(backend);

        // Diverged update on i-1, then a follow-up on i-1, then an
        // unrelated update on i-2.
        h.queue
            .enqueue(
                ActionKind::UpdateItem,
                "i-1",
                field_map(&[("price", json!(20))]),
                Some(field_map(&[("price", json!(10))])),
            )
            .unwrap();
        h.queue
            .enqueue(
                ActionKind::UpdateItem,
                "i-1",
                field_map(&[("price", json!(25))]),
                Some(field_map(&[("price", json!(20))])),
            )
            .unwrap();
        h.queue
            .enqueue(
                ActionKind::UpdateItem,
                "i-2",
                field_map(&[("name", json!("box kite"))]),
                Some(field_map(&[("name", json!("kite"))])),
            )
            .unwrap();

        let summary = summary(h.engine.try_drain().await.unwrap());
        assert_eq!(summary.conflicted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.remaining, 2);

        let conflict = h.surfaced.recv().await.unwrap();
        assert_eq!(conflict.entity, blocked_item);
        assert_eq!(conflict.local_data.get("price"), Some(&json!(20)));
        assert_eq!(conflict.server_data.get("price"), Some(&json!(99)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_of_missing_entity_commits() {
        let backend = MockBackend::new();
        let h = harness(backend);

        h.queue
            .enqueue(
                ActionKind::DeleteItem,
                "i-1",
                FieldMap::new(),
                Some(field_map(&[("name", json!("gone"))])),
            )
            .unwrap();

        let summary = summary(h.engine.try_drain().await.unwrap());
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.remaining, 0);
        // Nothing was submitted; the target was already gone.
        assert!(h.backend.submitted_kinds().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_resolution_discards_local_action() {
        let item = EntityRef::new(EntityKind::Item, "i-1");
        let backend =
            MockBackend::new().with_entity(item.clone(), field_map(&[("price", json!(99))]));
        let mut h = harness(backend);

        h.queue
            .enqueue(
                ActionKind::UpdateItem,
                "i-1",
                field_map(&[("price", json!(20))]),
                Some(field_map(&[("price", json!(10))])),
            )
            .unwrap();

        summary(h.engine.try_drain().await.unwrap());
        let conflict = h.surfaced.recv().await.unwrap();

        h.mediator
            .resolve(conflict.action_id, ResolutionStrategy::Server)
            .unwrap();

        // Wait for the resolution task to remove the action.
        for _ in 0..100 {
            if h.queue.actions().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(h.queue.actions().unwrap().is_empty());
        // Discarding the local action submits nothing.
        assert!(h.backend.submitted_kinds().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_resolution_resubmits_and_commits() {
        let item = EntityRef::new(EntityKind::Item, "i-1");
        let backend =
            MockBackend::new().with_entity(item.clone(), field_map(&[("price", json!(99))]));
        let mut h = harness(backend);

        h.queue
            .enqueue(
                ActionKind::UpdateItem,
                "i-1",
                field_map(&[("price", json!(20))]),
                Some(field_map(&[("price", json!(10))])),
            )
            .unwrap();

        summary(h.engine.try_drain().await.unwrap());
        let conflict = h.surfaced.recv().await.unwrap();

        h.mediator
            .resolve(conflict.action_id, ResolutionStrategy::Local)
            .unwrap();

        for _ in 0..100 {
            if h.queue.actions().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(h.queue.actions().unwrap().is_empty());
        // The local version went through as an overwrite.
        assert_eq!(h.backend.submitted_kinds(), vec![ActionKind::UpdateItem]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_submit_surfaces_conflict() {
        let item = EntityRef::new(EntityKind::Item, "i-1");
        let backend = MockBackend::new()
            .with_entity(item.clone(), field_map(&[("claimed_by", json!(null))]))
            .with_submit_failure(RemoteError::Rejected("already claimed".to_string()));
        let mut h = harness(backend);

        h.queue
            .enqueue(
                ActionKind::ClaimItem,
                "i-1",
                field_map(&[("claimed_by", json!("ana"))]),
                Some(field_map(&[("claimed_by", json!(null))])),
            )
            .unwrap();

        let summary = summary(h.engine.try_drain().await.unwrap());
        assert_eq!(summary.conflicted, 1);
        assert!(!summary.stopped_on_transient);

        let conflict = h.surfaced.recv().await.unwrap();
        assert_eq!(conflict.entity, item);
        assert_eq!(
            h.queue.find(conflict.action_id).unwrap().unwrap().status,
            ActionStatus::Conflicted
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn toggle_cancellation_mid_pass_skips_vanished_action() {
        let backend = MockBackend {
            submit_delay: Some(Duration::from_millis(30)),
            ..MockBackend::new()
        };
        let h = harness(backend);

        h.queue
            .enqueue(
                ActionKind::CreateItem,
                "i-1",
                field_map(&[("name", json!("one"))]),
                None,
            )
            .unwrap();
        let claimed = match h
            .queue
            .enqueue(
                ActionKind::ClaimItem,
                "i-2",
                field_map(&[("claimed_by", json!("ana"))]),
                Some(field_map(&[("claimed_by", json!(null))])),
            )
            .unwrap()
        {
            crate::queue::EnqueueOutcome::Enqueued(action) => action,
            crate::queue::EnqueueOutcome::CancelledOut { .. } => unreachable!(),
        };

        let drain = {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move { engine.try_drain().await })
        };

        // While the pass is inside the slow first submit, cancel the
        // claim that is already in the pass's snapshot.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let outcome = h
            .queue
            .enqueue(
                ActionKind::UnclaimItem,
                "i-2",
                field_map(&[("claimed_by", json!(null))]),
                Some(field_map(&[("claimed_by", json!("ana"))])),
            )
            .unwrap();
        assert_eq!(
            outcome,
            crate::queue::EnqueueOutcome::CancelledOut {
                removed: claimed.id
            }
        );

        // The pass must tolerate the vanished action, not abort.
        let summary = summary(drain.await.unwrap().unwrap());
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.stopped_on_transient);
        assert!(h.queue.actions().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn actions_enqueued_mid_pass_wait_for_next_pass() {
        let backend = MockBackend {
            submit_delay: Some(Duration::from_millis(30)),
            ..MockBackend::new()
        };
        let h = harness(backend);

        h.queue
            .enqueue(
                ActionKind::CreateItem,
                "i-1",
                field_map(&[("name", json!("one"))]),
                None,
            )
            .unwrap();

        let drain = {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move { engine.try_drain().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        h.queue
            .enqueue(
                ActionKind::CreateItem,
                "i-2",
                field_map(&[("name", json!("two"))]),
                None,
            )
            .unwrap();

        let summary = summary(drain.await.unwrap().unwrap());
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.remaining, 1);
    }
}
