// ── Incident board ──
//
// Owns the incident store, drives the periodic list refresh through a
// poller, and runs edit/close as optimistic commands. The store lock is
// a plain mutex that is never held across an await: a command takes it
// to stage the change, releases it for the request, and takes it again
// to settle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::{Local, SubsecRound, Utc};
use sivmon_api::{ClosePayload, IncidentRecord, SivClient};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::{CommandTicket, IncidentStore, PendingCommand};
use super::visibility::IncidentFilter;
use crate::config::{MonitorConfig, PollSettings};
use crate::error::CoreError;
use crate::fetch::{INCIDENT_FEED, IncidentFetcher};
use crate::model::{ErrorKind, Incident, IncidentDraft, IncidentEdit, ResourceId, User};
use crate::poller::{Cadence, PollEvent, Poller};
use crate::stream::EntityStream;

type FeedEvents = mpsc::UnboundedReceiver<PollEvent<Vec<IncidentRecord>>>;

/// Live incident list with optimistic edit and close.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct IncidentBoard {
    inner: Arc<BoardInner>,
}

struct BoardInner {
    client: SivClient,
    store: StdMutex<IncidentStore>,
    published: watch::Sender<Arc<Vec<Arc<Incident>>>>,
    poller: Poller<IncidentFetcher>,
    feed_rx: Mutex<Option<FeedEvents>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl IncidentBoard {
    /// Build a board. Does not poll until [`start()`](Self::start).
    pub fn new(config: &MonitorConfig, client: SivClient) -> Result<Self, CoreError> {
        config.validate()?;
        let cancel = CancellationToken::new();
        let settings = PollSettings {
            interval: config.incident_interval,
            focus_interval: config.incident_interval,
            request_timeout: config.polling.request_timeout,
        };
        let (poller, feed_rx) =
            Poller::new(IncidentFetcher::new(client.clone()), settings, &cancel);
        let (published, _) = watch::channel(Arc::new(Vec::new()));

        Ok(Self {
            inner: Arc::new(BoardInner {
                client,
                store: StdMutex::new(IncidentStore::new()),
                published,
                poller,
                feed_rx: Mutex::new(Some(feed_rx)),
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the periodic list refresh. A second call is a no-op.
    pub async fn start(&self) {
        let Some(rx) = self.inner.feed_rx.lock().await.take() else {
            return;
        };
        let board = self.clone();
        self.inner
            .task_handles
            .lock()
            .await
            .push(tokio::spawn(incident_feed_task(board, rx)));
        self.inner
            .poller
            .register(ResourceId::from(INCIDENT_FEED), Cadence::Standard);
        info!(
            interval_secs = self.inner.poller.settings().interval.as_secs(),
            "incident board started"
        );
    }

    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.poller.shutdown();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("incident board shut down");
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Every incident in the store, including ones the session user
    /// would not see.
    pub fn subscribe(&self) -> EntityStream<Incident> {
        EntityStream::new(self.inner.published.subscribe())
    }

    pub fn get(&self, id: u64) -> Option<Incident> {
        self.store().get(id).cloned()
    }

    pub fn pending(&self, id: u64) -> Option<PendingCommand> {
        self.store().pending(id).copied()
    }

    /// Incidents the session user is allowed to see.
    pub fn visible(&self) -> Vec<Incident> {
        let viewer = self.inner.client.session().user();
        self.store().visible(viewer).cloned().collect()
    }

    /// Visible incidents narrowed by `filter`. Never mutates the store.
    pub fn filtered(&self, filter: &IncidentFilter) -> Vec<Incident> {
        let viewer = self.inner.client.session().user();
        self.store().filtered(viewer, filter).cloned().collect()
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Fetch the full list now. Returns the number of incidents held.
    pub async fn refresh(&self) -> Result<usize, CoreError> {
        let as_of = std::time::Instant::now();
        let records = self.inner.client.list_incidents().await?;
        let listing = convert_records(records);
        let len = {
            let mut store = self.store();
            store.replace_all(listing, as_of);
            store.len()
        };
        self.publish();
        Ok(len)
    }

    /// Fetch the user directory and fill creator/closer names.
    pub async fn refresh_users(&self) -> Result<Vec<User>, CoreError> {
        let users: Vec<User> = self
            .inner
            .client
            .list_users()
            .await?
            .into_iter()
            .map(User::from)
            .collect();
        let names: HashMap<u64, String> =
            users.iter().map(|u| (u.id, u.username.clone())).collect();
        self.store().resolve_names(names);
        self.publish();
        Ok(users)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Create an incident. Validation runs before any request; the store
    /// changes only once the backend has assigned an id.
    pub async fn create(&self, draft: IncidentDraft) -> Result<Incident, CoreError> {
        let created_by = self.inner.client.session().user().id;
        let payload = draft.into_payload(created_by)?;
        let record = self.inner.client.create_incident(&payload).await?;
        let incident = Incident::try_from(record)?;

        self.store()
            .insert_confirmed(incident.clone(), std::time::Instant::now());
        self.publish();
        info!(incident = incident.id, kind = %incident.kind, "incident created");
        Ok(self.get(incident.id).unwrap_or(incident))
    }

    /// Edit an active incident. The change is visible immediately and
    /// rolled back if the backend refuses it.
    pub async fn edit(&self, id: u64, edit: IncidentEdit) -> Result<Incident, CoreError> {
        if edit.is_empty() {
            return self.get(id).ok_or_else(|| CoreError::not_found("incident", id));
        }
        let ticket = self.store().begin_edit(id, &edit)?;
        self.publish();

        let result = self.inner.client.update_incident(id, &edit.to_payload()).await;
        self.settle(&ticket, result)
    }

    /// Close an active incident as the session user.
    pub async fn close(&self, id: u64) -> Result<Incident, CoreError> {
        let closed_by = self.inner.client.session().user().id;
        let at = Utc::now().trunc_subsecs(0);
        let ticket = self.store().begin_close(id, closed_by, at)?;
        self.publish();

        let local = at.with_timezone(&Local);
        let payload = ClosePayload {
            close_by_id: closed_by,
            end_date: local.date_naive(),
            end_time: local.time(),
        };
        let result = self.inner.client.close_incident(id, &payload).await;
        self.settle(&ticket, result)
    }

    fn settle(
        &self,
        ticket: &CommandTicket,
        result: Result<IncidentRecord, sivmon_api::Error>,
    ) -> Result<Incident, CoreError> {
        let id = ticket.incident_id;
        let outcome = match result {
            Ok(record) => match Incident::try_from(record) {
                Ok(server) => {
                    self.store().confirm(ticket, server);
                    debug!(incident = id, seq = ticket.seq, kind = %ticket.kind, "command confirmed");
                    Ok(())
                }
                Err(e) => {
                    self.store().reject(ticket);
                    Err(e)
                }
            },
            Err(err) => {
                self.store().reject(ticket);
                warn!(incident = id, kind = %ticket.kind, error = %err, "command rejected, rolled back");
                Err(command_error(id, err))
            }
        };
        self.publish();
        outcome?;
        self.get(id).ok_or_else(|| CoreError::not_found("incident", id))
    }

    // ── Internals ────────────────────────────────────────────────────

    fn store(&self) -> MutexGuard<'_, IncidentStore> {
        self.inner.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self) {
        let snapshot: Vec<Arc<Incident>> =
            self.store().iter().cloned().map(Arc::new).collect();
        self.inner.published.send_replace(Arc::new(snapshot));
    }

    fn apply_listing(&self, records: Vec<IncidentRecord>, as_of: std::time::Instant) {
        let listing = convert_records(records);
        self.store().replace_all(listing, as_of);
        self.publish();
    }
}

/// Backend refusals (4xx) become conflicts; transport and auth failures
/// keep their own kind.
fn command_error(incident_id: u64, err: sivmon_api::Error) -> CoreError {
    match err {
        sivmon_api::Error::Http { status, message } if (400..500).contains(&status) => {
            CoreError::Conflict {
                incident_id,
                message,
            }
        }
        other => CoreError::from(other),
    }
}

fn convert_records(records: Vec<IncidentRecord>) -> Vec<Incident> {
    records
        .into_iter()
        .filter_map(|rec| match Incident::try_from(rec) {
            Ok(incident) => Some(incident),
            Err(e) => {
                warn!(error = %e, "skipping malformed incident");
                None
            }
        })
        .collect()
}

// ── Background task ──────────────────────────────────────────────────

async fn incident_feed_task(board: IncidentBoard, mut rx: FeedEvents) {
    let cancel = board.inner.cancel.clone();
    let mut generation = None;

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            PollEvent::Registered { generation: g, .. } => generation = Some(g),
            PollEvent::Deregistered { generation: g, .. } if generation == Some(g) => {
                generation = None;
            }
            PollEvent::Completed(result) if generation == Some(result.generation) => {
                match result.outcome {
                    Ok(records) => {
                        debug!(seq = result.seq, count = records.len(), "incident list refreshed");
                        board.apply_listing(records, result.issued_at.into_std());
                    }
                    Err(failure) if failure.kind == ErrorKind::Auth => {
                        warn!(error = %failure.message, "incident refresh unauthorized");
                    }
                    Err(failure) => {
                        debug!(kind = %failure.kind, error = %failure.message, "incident refresh failed");
                    }
                }
            }
            _ => {}
        }
    }
    debug!("incident feed task stopped");
}
