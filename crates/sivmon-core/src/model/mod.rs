// ── Domain model ──
//
// Canonical types shared by the poller, merger, derivation engine and
// the incident store. Wire types from `sivmon-api` are converted at the
// edge and never leak further.

pub mod alert;
pub mod derived;
pub mod incident;
pub mod resource_id;
pub mod snapshot;
pub mod user;

pub use alert::AlertEvent;
pub use derived::{AlertType, CongestionLevel, DashboardSummary, DerivedState};
pub use incident::{Incident, IncidentDraft, IncidentEdit, IncidentStatus, Priority};
pub use resource_id::ResourceId;
pub use snapshot::{ErrorKind, RawMetric, RawMetrics, Snapshot};
pub use user::{Role, SessionUser, User, sees_all_incidents};
