// ── Poller ──
//
// One background task per registered resource, all feeding a single
// unbounded channel drained by the owning controller's merge task.
//
// Ordering contract on that channel:
// - `Registered` is sent before the resource's task exists, so it
//   precedes every result of that registration.
// - `Deregistered` is sent after the task is cancelled. A result that
//   slipped out first carries the old generation and is discarded by
//   the consumer.
// - Each result carries a per-resource sequence number assigned when the
//   request was issued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::PollSettings;
use crate::fetch::{Fidelity, ResourceFetcher};
use crate::model::{ErrorKind, ResourceId};

// ── Cadence ──────────────────────────────────────────────────────────

/// How often, and at what fidelity, a resource is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Cadence {
    /// Background interval, standard fidelity.
    Standard,
    /// Immediate poll, then the focus interval at high fidelity.
    Focused,
    /// No requests until the cadence changes.
    Suspended,
}

impl Cadence {
    fn schedule(self, settings: &PollSettings) -> Option<(Duration, Fidelity)> {
        match self {
            Self::Standard => Some((settings.interval, Fidelity::Standard)),
            Self::Focused => Some((settings.focus_interval, Fidelity::High)),
            Self::Suspended => None,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// A failed poll, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl PollFailure {
    fn from_api(err: &sivmon_api::Error) -> Self {
        Self {
            kind: ErrorKind::from(err),
            message: err.to_string(),
        }
    }

    fn timeout(limit: Duration) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: format!("poll exceeded {}ms", limit.as_millis()),
        }
    }
}

#[derive(Debug)]
pub struct PollResult<T> {
    pub resource_id: ResourceId,
    pub generation: u64,
    pub seq: u64,
    /// Monotonic issue time, for ordering against local commands.
    pub issued_at: Instant,
    pub observed_at: DateTime<Utc>,
    pub outcome: Result<T, PollFailure>,
}

#[derive(Debug)]
pub enum PollEvent<T> {
    Registered {
        resource_id: ResourceId,
        generation: u64,
        cadence: Cadence,
    },
    CadenceChanged {
        resource_id: ResourceId,
        generation: u64,
        cadence: Cadence,
    },
    Completed(PollResult<T>),
    Deregistered {
        resource_id: ResourceId,
        generation: u64,
    },
}

// ── Poller ───────────────────────────────────────────────────────────

struct PollHandle {
    generation: u64,
    cadence: watch::Sender<Cadence>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

pub struct Poller<F: ResourceFetcher> {
    fetcher: Arc<F>,
    settings: PollSettings,
    events: mpsc::UnboundedSender<PollEvent<F::Output>>,
    handles: Mutex<IndexMap<ResourceId, PollHandle>>,
    next_generation: AtomicU64,
    cancel: CancellationToken,
}

impl<F: ResourceFetcher> Poller<F> {
    /// Create a poller whose tasks are children of `parent`.
    pub fn new(
        fetcher: F,
        settings: PollSettings,
        parent: &CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<PollEvent<F::Output>>) {
        let (events, rx) = mpsc::unbounded_channel();
        let poller = Self {
            fetcher: Arc::new(fetcher),
            settings,
            events,
            handles: Mutex::new(IndexMap::new()),
            next_generation: AtomicU64::new(1),
            cancel: parent.child_token(),
        };
        (poller, rx)
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Start polling `id`. Returns `false` if it is already registered.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register(&self, id: ResourceId, cadence: Cadence) -> bool {
        let mut handles = self.lock();
        if handles.contains_key(&id) || self.cancel.is_cancelled() {
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (cadence_tx, cadence_rx) = watch::channel(cadence);
        let cancel = self.cancel.child_token();

        let _ = self.events.send(PollEvent::Registered {
            resource_id: id.clone(),
            generation,
            cadence,
        });

        let task = PollTask {
            fetcher: Arc::clone(&self.fetcher),
            id: id.clone(),
            generation,
            settings: self.settings,
            cadence: cadence_rx,
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(task.run());

        debug!(resource = %id, generation, %cadence, "resource registered");
        handles.insert(
            id,
            PollHandle {
                generation,
                cadence: cadence_tx,
                cancel,
                join,
            },
        );
        true
    }

    /// Stop polling `id`; its in-flight request is cancelled.
    pub fn deregister(&self, id: &ResourceId) -> bool {
        let mut handles = self.lock();
        let Some(handle) = handles.shift_remove(id) else {
            return false;
        };
        handle.cancel.cancel();
        handle.join.abort();
        let _ = self.events.send(PollEvent::Deregistered {
            resource_id: id.clone(),
            generation: handle.generation,
        });
        debug!(resource = %id, generation = handle.generation, "resource deregistered");
        true
    }

    /// Change a resource's cadence. Returns `false` if it is not registered.
    pub fn set_cadence(&self, id: &ResourceId, cadence: Cadence) -> bool {
        let handles = self.lock();
        let Some(handle) = handles.get(id) else {
            return false;
        };
        let changed = handle.cadence.send_if_modified(|current| {
            if *current == cadence {
                false
            } else {
                *current = cadence;
                true
            }
        });
        if changed {
            trace!(resource = %id, %cadence, "cadence changed");
            let _ = self.events.send(PollEvent::CadenceChanged {
                resource_id: id.clone(),
                generation: handle.generation,
                cadence,
            });
        }
        true
    }

    pub fn cadence_of(&self, id: &ResourceId) -> Option<Cadence> {
        self.lock().get(id).map(|h| *h.cadence.borrow())
    }

    pub fn is_registered(&self, id: &ResourceId) -> bool {
        self.lock().contains_key(id)
    }

    /// Registered ids in registration order.
    pub fn registered(&self) -> Vec<ResourceId> {
        self.lock().keys().cloned().collect()
    }

    /// Cancel every task. Further registrations are refused.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let mut handles = self.lock();
        for (_, handle) in handles.drain(..) {
            handle.join.abort();
        }
        debug!("poller shut down");
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<ResourceId, PollHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: ResourceFetcher> Drop for Poller<F> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Per-resource task ────────────────────────────────────────────────

struct PollTask<F: ResourceFetcher> {
    fetcher: Arc<F>,
    id: ResourceId,
    generation: u64,
    settings: PollSettings,
    cadence: watch::Receiver<Cadence>,
    events: mpsc::UnboundedSender<PollEvent<F::Output>>,
    cancel: CancellationToken,
}

impl<F: ResourceFetcher> PollTask<F> {
    async fn run(mut self) {
        let mut seq = 0_u64;

        'cadence: loop {
            let cadence = *self.cadence.borrow_and_update();
            let (period, fidelity) = match cadence.schedule(&self.settings) {
                Some(schedule) => schedule,
                None => {
                    trace!(resource = %self.id, "polling suspended");
                    if self.wait_for_cadence_change().await {
                        continue;
                    }
                    break;
                }
            };

            // First tick fires immediately: entering a cadence polls at once.
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => break 'cadence,
                    changed = self.cadence.changed() => {
                        if changed.is_err() {
                            break 'cadence;
                        }
                        continue 'cadence;
                    }
                    _ = interval.tick() => {
                        seq += 1;
                        let Some(result) = self.poll_once(seq, fidelity).await else {
                            break 'cadence;
                        };
                        if self.events.send(PollEvent::Completed(result)).is_err() {
                            break 'cadence;
                        }
                    }
                }
            }
        }

        trace!(resource = %self.id, generation = self.generation, "poll task stopped");
    }

    /// `true` when the cadence changed, `false` on cancellation.
    async fn wait_for_cadence_change(&mut self) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            changed = self.cadence.changed() => changed.is_ok(),
        }
    }

    /// One request, bounded by the request timeout. `None` if cancelled.
    async fn poll_once(&self, seq: u64, fidelity: Fidelity) -> Option<PollResult<F::Output>> {
        let issued_at = Instant::now();
        debug!(resource = %self.id, seq, ?fidelity, "poll tick");

        let request = tokio::time::timeout(
            self.settings.request_timeout,
            self.fetcher.fetch(&self.id, fidelity),
        );
        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return None,
            res = request => match res {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(err)) => {
                    debug!(resource = %self.id, seq, error = %err, "poll failed");
                    Err(PollFailure::from_api(&err))
                }
                Err(_) => {
                    debug!(resource = %self.id, seq, "poll timed out");
                    Err(PollFailure::timeout(self.settings.request_timeout))
                }
            },
        };

        Some(PollResult {
            resource_id: self.id.clone(),
            generation: self.generation,
            seq,
            issued_at,
            observed_at: Utc::now(),
            outcome,
        })
    }
}
