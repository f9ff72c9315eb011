//! Async client for the SIV traffic-camera backend.
//!
//! One HTTP surface, three groups of endpoints, all mounted under a
//! configurable prefix (`/api` by default):
//!
//! - **Cameras**: per-camera heartbeat (`/camera/{id}/status`), full
//!   detector status (`/camera/{id}/status_full`), and fire-and-forget
//!   start/stop control.
//! - **Incidents**: list, create, update, and close (`/incidentes/`).
//! - **Users**: the user directory (`/users/`), used to resolve
//!   display names and roles.
//!
//! Every request carries the bearer token of an explicitly passed
//! [`SessionContext`]. A `401`/`403` response invalidates that session
//! instead of retrying.

pub mod cameras;
pub mod client;
pub mod error;
pub mod incidents;
pub mod models;
pub mod session;
pub mod transport;
pub mod users;

pub use client::{DEFAULT_API_PREFIX, SivClient};
pub use error::Error;
pub use models::{
    CameraStatus, CameraStatusFull, ClosePayload, IncidentPayload, IncidentRecord, Role,
    UserRecord,
};
pub use session::{SessionContext, SessionState, SessionUser};
pub use transport::TransportConfig;
