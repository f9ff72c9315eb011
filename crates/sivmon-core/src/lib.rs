//! Live-state aggregation core between `sivmon-api` and its consumers.
//!
//! This crate keeps a bounded set of independently failing camera feeds
//! fresh, merges their results into one consistent view, derives
//! congestion and alert levels, and runs the incident lifecycle:
//!
//! - **[`CameraMonitor`]**: Owns a [`Poller`] over the camera feeds and a
//!   single merge task, the only writer of the [`ResourceTable`], the
//!   derived states and the [`AlertLog`]. Focus changes re-plan poll
//!   cadences through the [`FocusController`].
//!
//! - **[`IncidentBoard`]**: Owns the [`IncidentStore`]: periodic list
//!   refresh, create, and optimistic edit/close reconciled by per-incident
//!   command sequence numbers. Role-scoped visibility and filtering are
//!   pure views.
//!
//! - **[`DerivationEngine`]**: Pure `Snapshot → DerivedState`, with an
//!   ordered alert rule list and configurable congestion thresholds.
//!
//! - **[`EntityStream<T>`]**: Subscription handle over published state:
//!   `current()` / `latest()` / `changed()`, or a `Stream`.
//!
//! The crate never reads files; configuration arrives as a
//! [`MonitorConfig`].

pub mod alert_log;
pub mod config;
pub mod controller;
pub mod derive;
pub mod error;
pub mod fetch;
pub mod focus;
pub mod incidents;
pub mod model;
pub mod poller;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use alert_log::{AlertLog, AlertLogReader, RecordOutcome};
pub use config::{AlertLogSettings, CameraSpec, MonitorConfig, PollSettings, Thresholds};
pub use controller::CameraMonitor;
pub use derive::{AlertRule, DerivationEngine, default_alert_rules};
pub use error::CoreError;
pub use fetch::{CameraFetcher, CameraReading, Fidelity, IncidentFetcher, ResourceFetcher};
pub use focus::{FocusController, FocusTransition};
pub use incidents::{
    CommandKind, IncidentBoard, IncidentFilter, IncidentStore, PendingCommand, Reconciliation,
};
pub use poller::{Cadence, PollEvent, PollFailure, PollResult, Poller};
pub use store::{MergeOutcome, ResourceTable, SequencedSnapshot, merge};
pub use stream::EntityStream;

pub use model::{
    AlertEvent, AlertType, CongestionLevel, DashboardSummary, DerivedState, ErrorKind, Incident,
    IncidentDraft, IncidentEdit, IncidentStatus, Priority, RawMetric, RawMetrics, ResourceId, Role,
    SessionUser, Snapshot, User,
};

// API types consumers need to build a monitor.
pub use sivmon_api::{DEFAULT_API_PREFIX, SessionContext, SessionState, SivClient, TransportConfig};
