// ── Alert log ──
//
// Bounded, newest-first log of derived alerts. The merge task is the
// only writer; every mutation republishes an immutable list through
// `arc-swap`, so readers never block the writer or each other.
//
// Coalescing is decided by the window alone, measured from the entry's
// first occurrence: a flag that flaps inside the window stays one entry,
// and an alert that holds past the window opens a new one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::AlertLogSettings;
use crate::model::{AlertEvent, AlertType, ResourceId};

/// What `record` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// An open entry for the same resource and type was refreshed.
    Coalesced,
}

#[derive(Debug, Clone)]
struct Entry {
    event: AlertEvent,
    first_at: DateTime<Utc>,
    /// Entries of a removed resource stay visible but absorb nothing.
    open: bool,
}

pub struct AlertLog {
    capacity: usize,
    window: Duration,
    entries: VecDeque<Entry>,
    published: Arc<ArcSwap<Vec<AlertEvent>>>,
}

impl AlertLog {
    pub fn new(settings: AlertLogSettings) -> Self {
        Self {
            capacity: settings.capacity.max(1),
            window: settings.coalescing_window,
            entries: VecDeque::with_capacity(settings.capacity.max(1) + 1),
            published: Arc::new(ArcSwap::from_pointee(Vec::new())),
        }
    }

    /// Cheap read handle, safe to use from any task.
    pub fn reader(&self) -> AlertLogReader {
        AlertLogReader {
            published: Arc::clone(&self.published),
        }
    }

    /// Record an alert observed at `at`.
    pub fn record(
        &mut self,
        resource_id: &ResourceId,
        alert_type: AlertType,
        at: DateTime<Utc>,
    ) -> RecordOutcome {
        if let Some(pos) = self.coalescing_entry(resource_id, alert_type, at) {
            if let Some(mut entry) = self.entries.remove(pos) {
                entry.event.occurred_at = at;
                self.entries.push_front(entry);
            }
            self.publish();
            return RecordOutcome::Coalesced;
        }

        debug!(resource = %resource_id, %alert_type, "alert recorded");
        self.entries.push_front(Entry {
            event: AlertEvent::new(resource_id.clone(), alert_type, at),
            first_at: at,
            open: true,
        });
        self.evict_oldest();
        self.publish();
        RecordOutcome::Inserted
    }

    /// The resource left the view: its next trigger is a new entry.
    pub fn clear(&mut self, resource_id: &ResourceId) {
        for entry in &mut self.entries {
            if entry.event.resource_id == *resource_id {
                entry.open = false;
            }
        }
    }

    /// Drop entries past capacity, oldest first.
    pub fn evict_oldest(&mut self) {
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                debug!(id = %evicted.event.id, "alert evicted");
            }
        }
    }

    /// Current list, newest first.
    pub fn snapshot(&self) -> Arc<Vec<AlertEvent>> {
        self.published.load_full()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn coalescing_entry(
        &self,
        resource_id: &ResourceId,
        alert_type: AlertType,
        at: DateTime<Utc>,
    ) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry.open
                && entry.event.resource_id == *resource_id
                && entry.event.alert_type == alert_type
                && within(entry.first_at, at, self.window)
        })
    }

    fn publish(&self) {
        let events: Vec<AlertEvent> = self.entries.iter().map(|e| e.event.clone()).collect();
        self.published.store(Arc::new(events));
    }
}

/// Read-only view of an [`AlertLog`].
#[derive(Clone)]
pub struct AlertLogReader {
    published: Arc<ArcSwap<Vec<AlertEvent>>>,
}

impl AlertLogReader {
    pub fn snapshot(&self) -> Arc<Vec<AlertEvent>> {
        self.published.load_full()
    }
}

impl std::fmt::Debug for AlertLogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertLogReader")
            .field("len", &self.published.load().len())
            .finish()
    }
}

fn within(previous: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    match (now - previous).to_std() {
        Ok(elapsed) => elapsed <= window,
        // Clock went backwards: treat as the same instant.
        Err(_) => true,
    }
}
