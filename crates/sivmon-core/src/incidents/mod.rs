// ── Incidents ──
//
// Lifecycle store with optimistic commands, role-scoped visibility and
// filtering, and the board that drives them against the backend.

mod board;
pub mod store;
pub mod visibility;

pub use board::IncidentBoard;
pub use store::{CommandKind, CommandTicket, IncidentStore, PendingCommand, Reconciliation};
pub use visibility::{IncidentFilter, is_visible_to};
