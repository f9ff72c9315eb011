// ── Resource table ──
//
// Keyed, insertion-ordered table of the latest snapshot per resource.
// Merging is per key: resources absent from a batch keep their entry,
// and a snapshot whose poll was issued before the stored one is
// discarded.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::model::{ResourceId, Snapshot};

/// A snapshot tagged with the sequence number of the poll that produced it.
#[derive(Debug, Clone)]
pub struct SequencedSnapshot {
    pub seq: u64,
    pub snapshot: Arc<Snapshot>,
}

impl SequencedSnapshot {
    pub fn new(seq: u64, snapshot: Snapshot) -> Self {
        Self {
            seq,
            snapshot: Arc::new(snapshot),
        }
    }
}

/// What `apply` did with an incoming snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    /// An equal or newer sequence was already applied.
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceTable {
    entries: IndexMap<ResourceId, SequencedSnapshot>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one snapshot in place.
    pub fn apply(&mut self, incoming: SequencedSnapshot) -> MergeOutcome {
        let id = incoming.snapshot.resource_id.clone();
        match self.entries.get_mut(&id) {
            Some(current) if current.seq >= incoming.seq => {
                debug!(
                    resource = %id,
                    stored = current.seq,
                    incoming = incoming.seq,
                    "discarding stale snapshot"
                );
                MergeOutcome::Stale
            }
            Some(current) => {
                *current = incoming;
                MergeOutcome::Replaced
            }
            None => {
                self.entries.insert(id, incoming);
                MergeOutcome::Inserted
            }
        }
    }

    /// Forget a resource. Only deregistration removes entries.
    pub fn remove(&mut self, id: &ResourceId) -> Option<Arc<Snapshot>> {
        self.entries.shift_remove(id).map(|e| e.snapshot)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Arc<Snapshot>> {
        self.entries.get(id).map(|e| &e.snapshot)
    }

    pub fn seq_of(&self, id: &ResourceId) -> Option<u64> {
        self.entries.get(id).map(|e| e.seq)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.entries.keys()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Arc<Snapshot>> {
        self.entries.values().map(|e| &e.snapshot)
    }
}

/// `merge(previous, incoming) -> new`. `previous` is left untouched.
pub fn merge(
    previous: &ResourceTable,
    incoming: impl IntoIterator<Item = SequencedSnapshot>,
) -> ResourceTable {
    let mut next = previous.clone();
    for snapshot in incoming {
        next.apply(snapshot);
    }
    next
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{ErrorKind, RawMetric, RawMetrics};
    use chrono::Utc;

    fn reading(id: &str, seq: u64, vehicles: f64) -> SequencedSnapshot {
        let mut metrics = RawMetrics::new();
        metrics.insert("vehiculos".into(), RawMetric::Number(vehicles));
        SequencedSnapshot::new(
            seq,
            Snapshot::observed(ResourceId::from(id), Utc::now(), true, metrics),
        )
    }

    fn vehicles(table: &ResourceTable, id: &str) -> Option<u32> {
        table.get(&ResourceId::from(id)).and_then(|s| s.count("vehiculos"))
    }

    #[test]
    fn absent_keys_retain_their_entry() {
        let table = merge(
            &ResourceTable::new(),
            [reading("1", 1, 3.0), reading("2", 1, 4.0)],
        );
        let next = merge(&table, [reading("1", 2, 9.0)]);

        assert_eq!(vehicles(&next, "1"), Some(9));
        assert_eq!(vehicles(&next, "2"), Some(4));
        // The previous table is a value, not a view.
        assert_eq!(vehicles(&table, "1"), Some(3));
    }

    #[test]
    fn failed_poll_is_kept_as_offline_entry() {
        let table = merge(&ResourceTable::new(), [reading("1", 1, 3.0)]);
        let failure = SequencedSnapshot::new(
            2,
            Snapshot::failed(ResourceId::from("1"), Utc::now(), ErrorKind::Network),
        );
        let next = merge(&table, [failure]);

        let entry = next.get(&ResourceId::from("1")).unwrap();
        assert!(!entry.online);
        assert_eq!(entry.fetch_error, Some(ErrorKind::Network));
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn late_response_from_older_request_is_discarded() {
        let mut table = ResourceTable::new();
        assert_eq!(table.apply(reading("1", 5, 10.0)), MergeOutcome::Inserted);
        assert_eq!(table.apply(reading("1", 4, 99.0)), MergeOutcome::Stale);
        assert_eq!(table.apply(reading("1", 5, 99.0)), MergeOutcome::Stale);
        assert_eq!(table.apply(reading("1", 6, 11.0)), MergeOutcome::Replaced);
        assert_eq!(vehicles(&table, "1"), Some(11));
        assert_eq!(table.seq_of(&ResourceId::from("1")), Some(6));
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut table = merge(
            &ResourceTable::new(),
            [reading("b", 1, 0.0), reading("a", 1, 0.0), reading("c", 1, 0.0)],
        );
        table.remove(&ResourceId::from("a"));
        let ids: Vec<_> = table.ids().map(ResourceId::as_str).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
