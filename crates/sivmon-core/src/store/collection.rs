// ── Reactive keyed collection ──
//
// Single-writer storage with push-based change notification. The merge
// task owns the collection; readers hold `watch::Receiver`s and see a
// rebuilt `Arc<Vec<Arc<T>>>` after every mutation.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

use crate::model::ResourceId;

pub(crate) type Published<T> = Arc<Vec<Arc<T>>>;

pub(crate) struct EntityCollection<T: Send + Sync + 'static> {
    by_id: IndexMap<ResourceId, Arc<T>>,
    snapshot: watch::Sender<Published<T>>,
}

impl<T: Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: IndexMap::new(),
            snapshot,
        }
    }

    /// Insert or replace without publishing. Returns `true` if the key
    /// was new. Call [`publish`](Self::publish) once per batch.
    pub(crate) fn stage(&mut self, id: ResourceId, entity: T) -> bool {
        self.by_id.insert(id, Arc::new(entity)).is_none()
    }

    pub(crate) fn remove(&mut self, id: &ResourceId) -> Option<Arc<T>> {
        let removed = self.by_id.shift_remove(id);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub(crate) fn get(&self, id: &ResourceId) -> Option<Arc<T>> {
        self.by_id.get(id).map(Arc::clone)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&ResourceId, &Arc<T>)> {
        self.by_id.iter()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Published<T>> {
        self.snapshot.subscribe()
    }

    /// Rebuild the snapshot and notify subscribers.
    pub(crate) fn publish(&self) {
        let values: Vec<Arc<T>> = self.by_id.values().map(Arc::clone).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }
}
