// Role-scoped visibility and the pure filter view.
//
// Both are presentation policy over the full fetched set. The backend
// enforces access control on its own; nothing here is a security check.

use chrono::NaiveDate;

use crate::model::{Incident, IncidentStatus, Priority, SessionUser, sees_all_incidents};

/// Admins and supervisors see everything; everyone else sees active
/// incidents plus the ones they closed themselves.
pub fn is_visible_to(viewer: &SessionUser, incident: &Incident) -> bool {
    sees_all_incidents(&viewer.role)
        || incident.is_active()
        || incident.closed_by == Some(viewer.id)
}

/// Status, priority and creation-date range. Unset criteria match all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub priority: Option<Priority>,
    /// Inclusive lower bound on the incident's reference date.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound.
    pub to: Option<NaiveDate>,
}

impl IncidentFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        if self.status.is_some_and(|s| s != incident.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != incident.priority) {
            return false;
        }
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(date) = incident.reference_date() else {
            return false;
        };
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}
