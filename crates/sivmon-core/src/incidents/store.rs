// ── Incident lifecycle store ──
//
// Authoritative local set of incidents with optimistic command overlay.
//
// Each entry keeps the last server-confirmed state and a local state the
// operator sees. `begin_edit` / `begin_close` apply the change locally
// and hand out a sequence-numbered ticket; `confirm` / `reject` settle
// it. A response whose ticket is older than the latest settled one for
// that incident is ignored.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use indexmap::IndexMap;
use tracing::debug;

use super::visibility::{IncidentFilter, is_visible_to};
use crate::error::CoreError;
use crate::model::{Incident, IncidentEdit, IncidentStatus, SessionUser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CommandKind {
    Edit,
    Close,
}

/// Proof of an in-flight optimistic command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTicket {
    pub incident_id: u64,
    pub seq: u64,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCommand {
    pub seq: u64,
    pub kind: CommandKind,
}

/// Whether a server response changed the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Applied,
    /// Superseded by a newer settled command.
    Ignored,
}

#[derive(Debug, Clone)]
struct Entry {
    confirmed: Incident,
    local: Incident,
    pending: Option<PendingCommand>,
    last_applied_seq: u64,
    /// Issue time of the listing, or receipt time of the command
    /// response, that produced `confirmed`.
    confirmed_at: Option<Instant>,
}

impl Entry {
    fn fresh(incident: Incident, confirmed_at: Option<Instant>) -> Self {
        Self {
            local: incident.clone(),
            confirmed: incident,
            pending: None,
            last_applied_seq: 0,
            confirmed_at,
        }
    }
}

#[derive(Debug, Default)]
pub struct IncidentStore {
    entries: IndexMap<u64, Entry>,
    next_seq: u64,
    names: HashMap<u64, String>,
}

impl IncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Local (possibly pending) state.
    pub fn get(&self, id: u64) -> Option<&Incident> {
        self.entries.get(&id).map(|e| &e.local)
    }

    /// Last server-confirmed state.
    pub fn confirmed(&self, id: u64) -> Option<&Incident> {
        self.entries.get(&id).map(|e| &e.confirmed)
    }

    pub fn pending(&self, id: u64) -> Option<&PendingCommand> {
        self.entries.get(&id).and_then(|e| e.pending.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Incident> {
        self.entries.values().map(|e| &e.local)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn visible<'a>(&'a self, viewer: &'a SessionUser) -> impl Iterator<Item = &'a Incident> {
        self.iter().filter(move |i| is_visible_to(viewer, i))
    }

    pub fn filtered<'a>(
        &'a self,
        viewer: &'a SessionUser,
        filter: &'a IncidentFilter,
    ) -> impl Iterator<Item = &'a Incident> {
        self.visible(viewer).filter(move |i| filter.matches(i))
    }

    // ── Server state ─────────────────────────────────────────────────

    /// Add a server-created incident.
    pub fn insert_confirmed(&mut self, incident: Incident, confirmed_at: Instant) {
        let incident = self.named(incident);
        self.entries
            .insert(incident.id, Entry::fresh(incident, Some(confirmed_at)));
    }

    /// Replace the set with a full server listing requested at `as_of`.
    ///
    /// Entries with a pending command keep their local overlay. Entries
    /// confirmed by a command issued after `as_of` are left alone, as are
    /// missing entries that are pending or newer than the listing. A
    /// listing never reopens an incident confirmed as `Cerrado`.
    pub fn replace_all(&mut self, listing: Vec<Incident>, as_of: Instant) {
        let mut seen = HashSet::with_capacity(listing.len());

        for incoming in listing {
            let incoming = self.named(incoming);
            seen.insert(incoming.id);
            match self.entries.get_mut(&incoming.id) {
                Some(entry) if entry.confirmed_at.is_some_and(|t| t > as_of) => {
                    debug!(incident = incoming.id, "listing older than confirmed state");
                }
                Some(entry)
                    if entry.confirmed.status == IncidentStatus::Cerrado
                        && incoming.status == IncidentStatus::Activo =>
                {
                    debug!(incident = incoming.id, "listing would reopen a closed incident");
                }
                Some(entry) => {
                    if entry.pending.is_none() {
                        entry.local = incoming.clone();
                    }
                    entry.confirmed = incoming;
                    entry.confirmed_at = Some(as_of);
                }
                None => {
                    self.entries
                        .insert(incoming.id, Entry::fresh(incoming, Some(as_of)));
                }
            }
        }

        self.entries.retain(|id, entry| {
            seen.contains(id)
                || entry.pending.is_some()
                || entry.confirmed_at.is_some_and(|t| t > as_of)
        });
    }

    /// Install the id → username map and fill display names.
    pub fn resolve_names(&mut self, names: HashMap<u64, String>) {
        self.names = names;
        let names = &self.names;
        for entry in self.entries.values_mut() {
            apply_names(names, &mut entry.confirmed);
            apply_names(names, &mut entry.local);
        }
    }

    // ── Optimistic commands ──────────────────────────────────────────

    /// Apply an edit locally and mark it pending.
    pub fn begin_edit(&mut self, id: u64, edit: &IncidentEdit) -> Result<CommandTicket, CoreError> {
        let blank = edit.blank_required_fields();
        if !blank.is_empty() {
            return Err(CoreError::Validation {
                fields: blank.into_iter().map(str::to_owned).collect(),
            });
        }
        let seq = self.bump_seq();
        let entry = self.active_entry(id)?;
        edit.apply_to(&mut entry.local);
        entry.pending = Some(PendingCommand {
            seq,
            kind: CommandKind::Edit,
        });
        debug!(incident = id, seq, "edit pending");
        Ok(ticket(id, seq, CommandKind::Edit))
    }

    /// Close locally: `Activo → Cerrado` with `closed_by` and `closed_at`
    /// set together.
    pub fn begin_close(
        &mut self,
        id: u64,
        closed_by: u64,
        at: DateTime<Utc>,
    ) -> Result<CommandTicket, CoreError> {
        let seq = self.bump_seq();
        let closed_by_name = self.names.get(&closed_by).cloned();
        let entry = self.active_entry(id)?;

        let local_time = at.with_timezone(&Local);
        let incident = &mut entry.local;
        incident.status = IncidentStatus::Cerrado;
        incident.closed_by = Some(closed_by);
        incident.closed_by_name = closed_by_name;
        incident.closed_at = Some(at);
        incident.end_date = Some(local_time.date_naive());
        incident.end_time = Some(local_time.time());

        entry.pending = Some(PendingCommand {
            seq,
            kind: CommandKind::Close,
        });
        debug!(incident = id, seq, closed_by, "close pending");
        Ok(ticket(id, seq, CommandKind::Close))
    }

    /// Server accepted the command; its fields become authoritative.
    pub fn confirm(&mut self, ticket: &CommandTicket, server: Incident) -> Reconciliation {
        let server = self.named(server);
        let received_at = Instant::now();
        let Some(entry) = self.entries.get_mut(&ticket.incident_id) else {
            self.entries
                .insert(server.id, Entry::fresh(server, Some(received_at)));
            return Reconciliation::Applied;
        };
        if ticket.seq < entry.last_applied_seq {
            debug!(incident = ticket.incident_id, seq = ticket.seq, "stale confirmation ignored");
            return Reconciliation::Ignored;
        }

        entry.last_applied_seq = ticket.seq;
        entry.confirmed = server;
        entry.confirmed_at = Some(received_at);
        match entry.pending {
            Some(p) if p.seq > ticket.seq => {}
            _ => {
                entry.pending = None;
                entry.local = entry.confirmed.clone();
            }
        }
        Reconciliation::Applied
    }

    /// Server refused (or never answered); roll back to confirmed state.
    pub fn reject(&mut self, ticket: &CommandTicket) -> Reconciliation {
        let Some(entry) = self.entries.get_mut(&ticket.incident_id) else {
            return Reconciliation::Ignored;
        };
        if ticket.seq < entry.last_applied_seq {
            return Reconciliation::Ignored;
        }

        entry.last_applied_seq = ticket.seq;
        if entry.pending.is_some_and(|p| p.seq == ticket.seq) {
            entry.pending = None;
            entry.local = entry.confirmed.clone();
            debug!(incident = ticket.incident_id, seq = ticket.seq, "rolled back");
        }
        Reconciliation::Applied
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn active_entry(&mut self, id: u64) -> Result<&mut Entry, CoreError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("incident", id))?;
        if entry.local.status == IncidentStatus::Cerrado {
            return Err(CoreError::StaleState { incident_id: id });
        }
        Ok(entry)
    }

    fn named(&self, mut incident: Incident) -> Incident {
        apply_names(&self.names, &mut incident);
        incident
    }
}

fn ticket(incident_id: u64, seq: u64, kind: CommandKind) -> CommandTicket {
    CommandTicket {
        incident_id,
        seq,
        kind,
    }
}

fn apply_names(names: &HashMap<u64, String>, incident: &mut Incident) {
    if let Some(name) = incident.created_by.and_then(|id| names.get(&id)) {
        incident.created_by_name = Some(name.clone());
    }
    if let Some(name) = incident.closed_by.and_then(|id| names.get(&id)) {
        incident.closed_by_name = Some(name.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Priority, Role};
    use chrono::{NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn incident(id: u64, status: IncidentStatus) -> Incident {
        Incident {
            id,
            kind: "Robo".into(),
            priority: Priority::Alta,
            status,
            camera: Some("C1".into()),
            sector: None,
            pista: BTreeSet::new(),
            trabajos_via: BTreeSet::new(),
            observation: Some("original".into()),
            ubicacion_via: None,
            senalizacion: None,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            start_time: NaiveTime::from_hms_opt(8, 0, 0),
            end_date: None,
            end_time: None,
            created_at: None,
            created_by: Some(3),
            created_by_name: None,
            closed_at: None,
            closed_by: None,
            closed_by_name: None,
        }
    }

    fn closed_by(id: u64, user: u64) -> Incident {
        let mut i = incident(id, IncidentStatus::Cerrado);
        i.closed_by = Some(user);
        i.closed_at = Some(Utc::now());
        i
    }

    fn viewer(id: u64, role: Role) -> SessionUser {
        SessionUser {
            id,
            username: format!("user{id}"),
            role,
        }
    }

    fn store_with(incidents: Vec<Incident>) -> IncidentStore {
        let mut store = IncidentStore::new();
        store.replace_all(incidents, Instant::now());
        store
    }

    #[test]
    fn close_then_second_close_is_rejected() {
        let mut store = store_with(vec![incident(1, IncidentStatus::Activo)]);

        let ticket = store.begin_close(1, 7, Utc::now()).unwrap();
        let local = store.get(1).unwrap();
        assert_eq!(local.status, IncidentStatus::Cerrado);
        assert_eq!(local.closed_by, Some(7));
        assert!(local.closed_at.is_some());
        assert_eq!(store.pending(1).map(|p| p.kind), Some(CommandKind::Close));

        let mut server = local.clone();
        server.observation = Some("cerrado en servidor".into());
        assert_eq!(store.confirm(&ticket, server), Reconciliation::Applied);
        assert!(store.pending(1).is_none());
        assert_eq!(store.get(1).unwrap().observation.as_deref(), Some("cerrado en servidor"));

        let second = store.begin_close(1, 7, Utc::now());
        assert!(matches!(second, Err(CoreError::StaleState { incident_id: 1 })));
    }

    #[test]
    fn listing_issued_during_close_does_not_reopen() {
        let mut store = store_with(vec![incident(1, IncidentStatus::Activo)]);

        let ticket = store.begin_close(1, 7, Utc::now()).unwrap();
        let listing_issued = Instant::now();
        let server = store.get(1).unwrap().clone();
        assert_eq!(store.confirm(&ticket, server), Reconciliation::Applied);

        store.replace_all(vec![incident(1, IncidentStatus::Activo)], listing_issued);
        assert_eq!(store.get(1).unwrap().status, IncidentStatus::Cerrado);
        assert_eq!(store.confirmed(1).unwrap().status, IncidentStatus::Cerrado);
        assert!(matches!(
            store.begin_close(1, 7, Utc::now()),
            Err(CoreError::StaleState { incident_id: 1 })
        ));

        // Even a later listing cannot move it back.
        store.replace_all(vec![incident(1, IncidentStatus::Activo)], Instant::now());
        assert_eq!(store.get(1).unwrap().status, IncidentStatus::Cerrado);
    }

    #[test]
    fn closed_incident_cannot_be_edited_or_reopened() {
        let mut store = store_with(vec![closed_by(2, 9)]);
        let edit = IncidentEdit {
            observation: Some("reabrir".into()),
            ..IncidentEdit::default()
        };
        assert!(matches!(
            store.begin_edit(2, &edit),
            Err(CoreError::StaleState { .. })
        ));
        assert_eq!(store.get(2).unwrap().status, IncidentStatus::Cerrado);
    }

    #[test]
    fn rejected_close_restores_pre_close_fields() {
        let original = incident(1, IncidentStatus::Activo);
        let mut store = store_with(vec![original.clone()]);

        let ticket = store.begin_close(1, 7, Utc::now()).unwrap();
        assert_eq!(store.reject(&ticket), Reconciliation::Applied);

        assert_eq!(store.get(1), Some(&original));
        assert!(store.pending(1).is_none());
    }

    #[test]
    fn older_response_is_ignored_after_newer_settles() {
        let mut store = store_with(vec![incident(1, IncidentStatus::Activo)]);
        let first = store
            .begin_edit(
                1,
                &IncidentEdit {
                    observation: Some("v1".into()),
                    ..IncidentEdit::default()
                },
            )
            .unwrap();
        let second = store
            .begin_edit(
                1,
                &IncidentEdit {
                    observation: Some("v2".into()),
                    ..IncidentEdit::default()
                },
            )
            .unwrap();
        assert!(second.seq > first.seq);

        let mut v2 = incident(1, IncidentStatus::Activo);
        v2.observation = Some("v2".into());
        assert_eq!(store.confirm(&second, v2), Reconciliation::Applied);

        let mut v1 = incident(1, IncidentStatus::Activo);
        v1.observation = Some("v1".into());
        assert_eq!(store.confirm(&first, v1), Reconciliation::Ignored);
        assert_eq!(store.get(1).unwrap().observation.as_deref(), Some("v2"));
    }

    #[test]
    fn confirming_older_command_keeps_newer_overlay() {
        let mut store = store_with(vec![incident(1, IncidentStatus::Activo)]);
        let first = store
            .begin_edit(
                1,
                &IncidentEdit {
                    priority: Some(Priority::Media),
                    ..IncidentEdit::default()
                },
            )
            .unwrap();
        store
            .begin_edit(
                1,
                &IncidentEdit {
                    observation: Some("local".into()),
                    ..IncidentEdit::default()
                },
            )
            .unwrap();

        let mut server = incident(1, IncidentStatus::Activo);
        server.priority = Priority::Media;
        store.confirm(&first, server);

        assert_eq!(store.get(1).unwrap().observation.as_deref(), Some("local"));
        assert_eq!(store.confirmed(1).unwrap().priority, Priority::Media);
        assert_eq!(store.pending(1).map(|p| p.kind), Some(CommandKind::Edit));
    }

    #[test]
    fn blank_required_field_in_edit_is_a_validation_error() {
        let mut store = store_with(vec![incident(1, IncidentStatus::Activo)]);
        let edit = IncidentEdit {
            kind: Some(" ".into()),
            ..IncidentEdit::default()
        };
        assert!(matches!(
            store.begin_edit(1, &edit),
            Err(CoreError::Validation { .. })
        ));
        assert!(store.pending(1).is_none());
    }

    #[test]
    fn unknown_incident_is_not_found() {
        let mut store = IncidentStore::new();
        assert!(matches!(
            store.begin_close(42, 7, Utc::now()),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn operator_sees_only_active_and_own_closures() {
        let store = store_with(vec![
            incident(1, IncidentStatus::Activo),
            incident(2, IncidentStatus::Activo),
            incident(3, IncidentStatus::Activo),
            closed_by(4, 9),
            closed_by(5, 9),
        ]);

        let operator = viewer(7, Role::Operator);
        let ids: Vec<u64> = store.visible(&operator).map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let closer = viewer(9, Role::Operator);
        assert_eq!(store.visible(&closer).count(), 5);

        for role in [Role::Admin, Role::Supervisor] {
            assert_eq!(store.visible(&viewer(1, role)).count(), 5);
        }
    }

    #[test]
    fn filter_is_a_pure_view() {
        let mut high = incident(1, IncidentStatus::Activo);
        high.created_at = NaiveDate::from_ymd_opt(2025, 2, 10)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .map(|n| n.and_utc());
        let mut low = incident(2, IncidentStatus::Activo);
        low.priority = Priority::Baja;
        let store = store_with(vec![high, low, closed_by(3, 1)]);
        let admin = viewer(1, Role::Admin);

        let by_priority = IncidentFilter {
            priority: Some(Priority::Baja),
            ..IncidentFilter::default()
        };
        let ids: Vec<u64> = store.filtered(&admin, &by_priority).map(|i| i.id).collect();
        assert_eq!(ids, vec![2]);

        let by_range = IncidentFilter {
            from: NaiveDate::from_ymd_opt(2025, 2, 1),
            to: NaiveDate::from_ymd_opt(2025, 2, 28),
            ..IncidentFilter::default()
        };
        let ids: Vec<u64> = store.filtered(&admin, &by_range).map(|i| i.id).collect();
        assert_eq!(ids, vec![1]);

        let closed = IncidentFilter {
            status: Some(IncidentStatus::Cerrado),
            ..IncidentFilter::default()
        };
        assert_eq!(store.filtered(&admin, &closed).count(), 1);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn listing_keeps_pending_overlay_and_drops_vanished() {
        let mut store = store_with(vec![
            incident(1, IncidentStatus::Activo),
            incident(2, IncidentStatus::Activo),
        ]);
        store.begin_close(1, 7, Utc::now()).unwrap();

        store.replace_all(vec![incident(1, IncidentStatus::Activo)], Instant::now());

        assert_eq!(store.get(1).unwrap().status, IncidentStatus::Cerrado);
        assert_eq!(store.confirmed(1).unwrap().status, IncidentStatus::Activo);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn listing_requested_before_confirmation_does_not_regress() {
        let mut store = store_with(vec![incident(1, IncidentStatus::Activo)]);
        let listing_issued = Instant::now();
        std::thread::sleep(Duration::from_millis(2));

        let ticket = store.begin_close(1, 7, Utc::now()).unwrap();
        store.confirm(&ticket, closed_by(1, 7));

        store.replace_all(vec![incident(1, IncidentStatus::Activo)], listing_issued);
        assert_eq!(store.get(1).unwrap().status, IncidentStatus::Cerrado);
    }

    #[test]
    fn names_resolve_for_creator_and_closer() {
        let mut store = store_with(vec![closed_by(1, 7)]);
        store.resolve_names(HashMap::from([(3, "ana".to_owned()), (7, "luis".to_owned())]));
        let i = store.get(1).unwrap();
        assert_eq!(i.created_by_name.as_deref(), Some("ana"));
        assert_eq!(i.closed_by_name.as_deref(), Some("luis"));

        store.insert_confirmed(incident(2, IncidentStatus::Activo), Instant::now());
        assert_eq!(store.get(2).unwrap().created_by_name.as_deref(), Some("ana"));
    }
}
