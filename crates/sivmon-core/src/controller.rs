// ── Camera monitor ──
//
// Full lifecycle owner for the live camera view. Poll tasks fan out
// through the `Poller`; every result funnels into one merge task that
// is the only writer of the resource table, the derived-state collection
// and the alert log. Readers see published snapshots only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use sivmon_api::{SessionState, SivClient};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::alert_log::{AlertLog, AlertLogReader};
use crate::config::MonitorConfig;
use crate::derive::DerivationEngine;
use crate::error::CoreError;
use crate::fetch::{CameraFetcher, CameraReading};
use crate::focus::{FocusController, FocusTransition};
use crate::model::{AlertEvent, DashboardSummary, DerivedState, ResourceId, Snapshot};
use crate::poller::{Cadence, PollEvent, PollResult, Poller};
use crate::store::{EntityCollection, ResourceTable, SequencedSnapshot, merge};
use crate::stream::EntityStream;

type CameraEvents = mpsc::UnboundedReceiver<PollEvent<CameraReading>>;

// ── CameraMonitor ────────────────────────────────────────────────────

/// Live camera dashboard state.
///
/// Cheaply cloneable via `Arc<MonitorInner>`. Create with
/// [`new()`](Self::new), then [`start()`](Self::start) to spawn the merge
/// task and begin polling the configured cameras.
#[derive(Clone)]
pub struct CameraMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    client: SivClient,
    poller: Poller<CameraFetcher>,
    /// Guards cadence changes so a focus transfer is applied as a whole.
    focus: StdMutex<FocusController>,
    states: watch::Receiver<Arc<Vec<Arc<DerivedState>>>>,
    table: watch::Receiver<Arc<ResourceTable>>,
    alerts: AlertLogReader,
    /// Moved into the merge task on `start()`.
    merge: Mutex<Option<(MergeState, CameraEvents)>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl CameraMonitor {
    /// Build a monitor. Does not poll until [`start()`](Self::start).
    pub fn new(config: MonitorConfig, client: SivClient) -> Result<Self, CoreError> {
        config.validate()?;

        let cancel = CancellationToken::new();
        let (poller, events) =
            Poller::new(CameraFetcher::new(client.clone()), config.polling, &cancel);

        let engine = DerivationEngine::new(config.thresholds).with_stale_after(config.stale_after);
        let merge_state = MergeState::new(engine, AlertLog::new(config.alerts));
        let states = merge_state.derived.subscribe();
        let table = merge_state.table_tx.subscribe();
        let alerts = merge_state.alerts.reader();
        let focus = FocusController::new(config.suspend_background_on_focus);

        Ok(Self {
            inner: Arc::new(MonitorInner {
                config,
                client,
                poller,
                focus: StdMutex::new(focus),
                states,
                table,
                alerts,
                merge: Mutex::new(Some((merge_state, events))),
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the merge and session tasks and register every configured
    /// camera. A second call is a no-op.
    pub async fn start(&self) {
        let Some((state, events)) = self.inner.merge.lock().await.take() else {
            return;
        };

        let sweep_every = self
            .inner
            .config
            .stale_after
            .map(|_| self.inner.config.polling.interval);
        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(merge_task(
            state,
            events,
            sweep_every,
            self.inner.cancel.clone(),
        )));
        handles.push(tokio::spawn(session_watch_task(self.clone())));
        drop(handles);

        for camera in &self.inner.config.cameras {
            self.register_camera(camera.id.clone());
        }
        info!(
            cameras = self.inner.config.cameras.len(),
            interval_ms = self.inner.config.polling.interval.as_millis(),
            "camera monitor started"
        );
    }

    /// Cancel polling and join background tasks. Published state stays
    /// readable.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.poller.shutdown();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("camera monitor shut down");
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Start polling a camera at the cadence the current focus implies.
    /// Returns `false` if it was already registered.
    pub fn register_camera(&self, id: impl Into<ResourceId>) -> bool {
        let id = id.into();
        let focus = self.focus_lock();
        let cadence = focus.cadence_for(&id);
        self.inner.poller.register(id, cadence)
    }

    /// Stop polling a camera and drop its state. Exits focus if it was
    /// the focused camera.
    pub fn deregister_camera(&self, id: &ResourceId) -> bool {
        let mut focus = self.focus_lock();
        if !self.inner.poller.deregister(id) {
            return false;
        }
        if focus.on_resource_removed(id) {
            info!(camera = %id, "focused camera removed, leaving focus");
            self.apply_cadence_plan(&focus);
        }
        true
    }

    pub fn cameras(&self) -> Vec<ResourceId> {
        self.inner.poller.registered()
    }

    // ── Focus ────────────────────────────────────────────────────────

    /// Focus a registered camera: it is polled immediately at high
    /// fidelity, and the rest drop to background cadence.
    pub fn focus(&self, id: impl Into<ResourceId>) -> Result<FocusTransition, CoreError> {
        let id = id.into();
        let mut focus = self.focus_lock();
        if !self.inner.poller.is_registered(&id) {
            return Err(CoreError::not_found("camera", &id));
        }
        let transition = focus.focus(id);
        if transition != FocusTransition::Unchanged {
            self.apply_cadence_plan(&focus);
            debug!(?transition, "focus changed");
        }
        Ok(transition)
    }

    /// Leave focus; every camera returns to standard cadence.
    pub fn unfocus(&self) -> Option<ResourceId> {
        let mut focus = self.focus_lock();
        let previous = focus.unfocus();
        if previous.is_some() {
            self.apply_cadence_plan(&focus);
        }
        previous
    }

    pub fn focused(&self) -> Option<ResourceId> {
        self.focus_lock().focused().cloned()
    }

    pub fn cadence_of(&self, id: &ResourceId) -> Option<Cadence> {
        self.inner.poller.cadence_of(id)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Subscribe to derived camera states.
    pub fn states(&self) -> EntityStream<DerivedState> {
        EntityStream::new(self.inner.states.clone())
    }

    pub fn states_snapshot(&self) -> Arc<Vec<Arc<DerivedState>>> {
        self.inner.states.borrow().clone()
    }

    pub fn state_of(&self, id: &ResourceId) -> Option<Arc<DerivedState>> {
        self.inner
            .states
            .borrow()
            .iter()
            .find(|s| s.resource_id == *id)
            .cloned()
    }

    /// Latest merged snapshot for a camera.
    pub fn snapshot_of(&self, id: &ResourceId) -> Option<Arc<Snapshot>> {
        self.inner.table.borrow().get(id).cloned()
    }

    /// Alert log, newest first.
    pub fn alerts(&self) -> Arc<Vec<AlertEvent>> {
        self.inner.alerts.snapshot()
    }

    pub fn summary(&self) -> DashboardSummary {
        let states = self.states_snapshot();
        DashboardSummary::from_states(
            states.iter().map(AsRef::as_ref),
            self.inner.poller.registered().len(),
            self.alerts().len(),
        )
    }

    /// Session state of the client this monitor polls with.
    pub fn session_state(&self) -> watch::Receiver<SessionState> {
        self.inner.client.session().subscribe()
    }

    // ── Camera control ───────────────────────────────────────────────

    /// Ask the backend to start a camera's processing pipeline.
    pub async fn start_camera(&self, id: &ResourceId) -> Result<(), CoreError> {
        self.inner.client.start_camera(id.as_str()).await?;
        info!(camera = %id, "camera start requested");
        Ok(())
    }

    pub async fn stop_camera(&self, id: &ResourceId) -> Result<(), CoreError> {
        self.inner.client.stop_camera(id.as_str()).await?;
        info!(camera = %id, "camera stop requested");
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    fn focus_lock(&self) -> MutexGuard<'_, FocusController> {
        self.inner.focus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller holds the focus lock.
    fn apply_cadence_plan(&self, focus: &FocusController) {
        let ids = self.inner.poller.registered();
        for (id, cadence) in focus.cadence_plan(&ids) {
            self.inner.poller.set_cadence(&id, cadence);
        }
    }
}

// ── Merge state ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Registration {
    generation: u64,
    cadence: Cadence,
}

/// Everything the merge task owns.
struct MergeState {
    engine: DerivationEngine,
    table: Arc<ResourceTable>,
    table_tx: watch::Sender<Arc<ResourceTable>>,
    derived: EntityCollection<DerivedState>,
    alerts: AlertLog,
    registrations: HashMap<ResourceId, Registration>,
}

impl MergeState {
    fn new(engine: DerivationEngine, alerts: AlertLog) -> Self {
        let table = Arc::new(ResourceTable::new());
        let (table_tx, _) = watch::channel(Arc::clone(&table));
        Self {
            engine,
            table,
            table_tx,
            derived: EntityCollection::new(),
            alerts,
            registrations: HashMap::new(),
        }
    }

    fn is_current(&self, id: &ResourceId, generation: u64) -> bool {
        self.registrations
            .get(id)
            .is_some_and(|r| r.generation == generation)
    }

    /// Apply one drained batch of poller events in order.
    fn apply_batch(&mut self, events: Vec<PollEvent<CameraReading>>, now: DateTime<Utc>) {
        let mut table = Arc::clone(&self.table);
        let mut run: Vec<SequencedSnapshot> = Vec::new();
        let mut touched: IndexSet<ResourceId> = IndexSet::new();
        let mut removed: Vec<ResourceId> = Vec::new();

        for event in events {
            match event {
                PollEvent::Registered {
                    resource_id,
                    generation,
                    cadence,
                } => {
                    flush(&mut table, &mut run, &mut touched);
                    // A previous registration's sequence numbers mean nothing now.
                    Arc::make_mut(&mut table).remove(&resource_id);
                    self.registrations
                        .insert(resource_id, Registration { generation, cadence });
                }
                PollEvent::CadenceChanged {
                    resource_id,
                    generation,
                    cadence,
                } => {
                    if let Some(reg) = self
                        .registrations
                        .get_mut(&resource_id)
                        .filter(|r| r.generation == generation)
                    {
                        reg.cadence = cadence;
                    }
                }
                PollEvent::Completed(result) => {
                    if self.is_current(&result.resource_id, result.generation) {
                        run.push(into_sequenced(result));
                    } else {
                        debug!(
                            camera = %result.resource_id,
                            generation = result.generation,
                            seq = result.seq,
                            "discarding result from retired registration"
                        );
                    }
                }
                PollEvent::Deregistered {
                    resource_id,
                    generation,
                } => {
                    if self.is_current(&resource_id, generation) {
                        flush(&mut table, &mut run, &mut touched);
                        Arc::make_mut(&mut table).remove(&resource_id);
                        self.registrations.remove(&resource_id);
                        touched.shift_remove(&resource_id);
                        removed.push(resource_id);
                    }
                }
            }
        }
        flush(&mut table, &mut run, &mut touched);

        for id in &removed {
            self.derived.remove(id);
            self.alerts.clear(id);
        }

        for id in &touched {
            let Some(snapshot) = table.get(id) else {
                continue;
            };
            let state = self.engine.derive_at(snapshot, now);
            if let Some(alert_type) = state.active_alert_type {
                self.alerts.record(id, alert_type, snapshot.observed_at);
            }
            trace!(
                camera = %id,
                online = state.online,
                congestion = %state.congestion_level,
                alert = ?state.active_alert_type,
                "derived"
            );
            self.derived.stage(id.clone(), state);
        }

        if !touched.is_empty() {
            self.derived.publish();
        }
        if !touched.is_empty() || !removed.is_empty() {
            self.table = Arc::clone(&table);
            self.table_tx.send_replace(table);
        }
    }

    /// Re-derive against the clock so silent cameras age into offline.
    /// Suspended cameras keep their last state.
    fn sweep(&mut self, now: DateTime<Utc>) {
        let mut changed = false;
        for snapshot in self.table.snapshots() {
            let id = &snapshot.resource_id;
            let suspended = self
                .registrations
                .get(id)
                .is_some_and(|r| r.cadence == Cadence::Suspended);
            if suspended {
                continue;
            }
            let state = self.engine.derive_at(snapshot, now);
            if self.derived.get(id).is_some_and(|current| *current == state) {
                continue;
            }
            debug!(camera = %id, online = state.online, "state aged by freshness sweep");
            self.derived.stage(id.clone(), state);
            changed = true;
        }
        if changed {
            self.derived.publish();
        }
    }
}

/// Merge pending results into `table` and note which were accepted.
fn flush(
    table: &mut Arc<ResourceTable>,
    run: &mut Vec<SequencedSnapshot>,
    touched: &mut IndexSet<ResourceId>,
) {
    if run.is_empty() {
        return;
    }
    let batch: Vec<SequencedSnapshot> = std::mem::take(run);
    let keys: Vec<(ResourceId, u64)> = batch
        .iter()
        .map(|s| (s.snapshot.resource_id.clone(), s.seq))
        .collect();
    let next = merge(table, batch);
    for (id, seq) in keys {
        if next.seq_of(&id) == Some(seq) {
            touched.insert(id);
        } else {
            debug!(camera = %id, seq, "stale result ignored");
        }
    }
    *table = Arc::new(next);
}

fn into_sequenced(result: PollResult<CameraReading>) -> SequencedSnapshot {
    let snapshot = match result.outcome {
        Ok(reading) => Snapshot::observed(
            result.resource_id,
            result.observed_at,
            reading.online,
            reading.metrics,
        ),
        Err(failure) => Snapshot::failed(result.resource_id, result.observed_at, failure.kind),
    };
    SequencedSnapshot::new(result.seq, snapshot)
}

// ── Background tasks ─────────────────────────────────────────────────

async fn merge_task(
    mut state: MergeState,
    mut rx: CameraEvents,
    sweep_every: Option<std::time::Duration>,
    cancel: CancellationToken,
) {
    let mut sweep = sweep_every.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                let mut batch = vec![event];
                while let Ok(more) = rx.try_recv() {
                    batch.push(more);
                }
                trace!(events = batch.len(), "merging batch");
                state.apply_batch(batch, Utc::now());
            }
            Some(_) = tick(sweep.as_mut()) => state.sweep(Utc::now()),
        }
    }
    debug!("merge task stopped");
}

async fn tick(interval: Option<&mut tokio::time::Interval>) -> Option<tokio::time::Instant> {
    match interval {
        Some(interval) => Some(interval.tick().await),
        None => std::future::pending().await,
    }
}

/// Stop polling once the session is gone; every request would fail.
async fn session_watch_task(monitor: CameraMonitor) {
    let mut session = monitor.session_state();
    let cancel = monitor.inner.cancel.clone();
    loop {
        if let SessionState::Invalidated { reason } = &*session.borrow_and_update() {
            warn!(%reason, "session invalidated, camera polling stopped");
            monitor.inner.poller.shutdown();
            break;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
