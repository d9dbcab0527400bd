//! Drain triggers
//!
//! Everything that can kick off a replay pass funnels into one abstract
//! "drain requested" signal: connectivity edges, platform sync
//! requests, retry timers, and a bounded fallback poll. The engine
//! never cares where a request came from.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use super::{DrainOutcome, ReplayEngine};

/// Why a drain was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    /// Connectivity transitioned offline -> online
    Online,
    /// Platform background-sync or cross-context message
    SyncRequest,
    /// Fallback poll fired with work queued
    Poll,
    /// Backoff timer after a transient failure
    Retry,
    /// A conflict resolution unblocked a branch
    Resume,
    /// Explicit caller request
    Manual,
}

/// Clonable producer handle for the drain-requested signal
#[derive(Clone)]
pub struct DrainSignal {
    tx: mpsc::UnboundedSender<DrainReason>,
}

impl DrainSignal {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DrainReason>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Request a drain. Requests are coalesced by the at-most-one-drain
    /// guard, so over-signaling is harmless.
    pub fn request(&self, reason: DrainReason) {
        let _ = self.tx.send(reason);
    }
}

/// Online/offline state fed by the embedding platform
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    pub fn set_online(&self) {
        self.tx.send_replace(true);
    }

    pub fn set_offline(&self) {
        self.tx.send_replace(false);
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Consumes the drain-requested signal and runs the engine.
///
/// Requests arriving while offline are dropped; the offline -> online
/// edge triggers its own drain, so nothing is lost.
pub struct DrainScheduler {
    engine: Arc<ReplayEngine>,
    requests: mpsc::UnboundedReceiver<DrainReason>,
    connectivity: watch::Receiver<bool>,
    poll_interval: Duration,
}

impl DrainScheduler {
    #[must_use]
    pub const fn new(
        engine: Arc<ReplayEngine>,
        requests: mpsc::UnboundedReceiver<DrainReason>,
        connectivity: watch::Receiver<bool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            engine,
            requests,
            connectivity,
            poll_interval,
        }
    }

    /// Run until all signal producers are gone
    pub async fn run(self) {
        let Self {
            engine,
            mut requests,
            mut connectivity,
            poll_interval,
        } = self;

        let mut poll = tokio::time::interval(poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first interval tick fires immediately; skip it so startup
        // drains come from the connectivity edge instead.
        poll.tick().await;

        let mut online = *connectivity.borrow();

        loop {
            tokio::select! {
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_online = *connectivity.borrow_and_update();
                    if now_online && !online {
                        drain(&engine, DrainReason::Online).await;
                    }
                    online = now_online;
                }
                request = requests.recv() => {
                    match request {
                        Some(reason) if online => drain(&engine, reason).await,
                        Some(reason) => {
                            tracing::debug!(?reason, "ignoring drain request while offline");
                        }
                        None => break,
                    }
                }
                _ = poll.tick() => {
                    if online && engine.has_pending() {
                        drain(&engine, DrainReason::Poll).await;
                    }
                }
            }
        }

        tracing::debug!("drain scheduler stopped");
    }
}

async fn drain(engine: &Arc<ReplayEngine>, reason: DrainReason) {
    match engine.try_drain().await {
        Ok(DrainOutcome::AlreadyRunning) => {
            tracing::trace!(?reason, "drain already in progress");
        }
        Ok(DrainOutcome::Completed(summary)) => {
            tracing::debug!(?reason, ?summary, "drain pass completed");
        }
        Err(error) => {
            tracing::warn!(?reason, %error, "drain pass failed");
        }
    }
}
