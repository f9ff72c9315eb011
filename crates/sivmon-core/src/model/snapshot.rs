// ── Snapshots ──
//
// One poll cycle's observation of one resource. Snapshots are immutable
// and shared behind `Arc`; a newer cycle supersedes, never mutates.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::ResourceId;

/// A single raw value reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMetric {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl RawMetric {
    /// Convert a JSON value. `null` has no metric; arrays and objects are
    /// kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            other => Some(Self::Text(other.to_string())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// Lenient truthiness: `true`, non-zero numbers, `"true"`/`"1"`.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => n.abs() > f64::EPSILON,
            Self::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        }
    }
}

/// Ordered raw metrics, in the order the backend sent them.
pub type RawMetrics = IndexMap<String, RawMetric>;

/// Why a poll produced no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum ErrorKind {
    Network,
    Timeout,
    Auth,
    Http(u16),
    Decode,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Timeout => f.write_str("timeout"),
            Self::Auth => f.write_str("auth"),
            Self::Http(status) => write!(f, "http {status}"),
            Self::Decode => f.write_str("decode"),
        }
    }
}

impl From<&sivmon_api::Error> for ErrorKind {
    fn from(err: &sivmon_api::Error) -> Self {
        use sivmon_api::Error as E;
        match err {
            E::Unauthorized { .. } | E::SessionInvalidated => Self::Auth,
            E::Timeout { .. } => Self::Timeout,
            E::Transport(e) if e.is_timeout() => Self::Timeout,
            E::Transport(e) if e.is_decode() => Self::Decode,
            E::Transport(_) | E::InvalidUrl(_) | E::Tls(_) => Self::Network,
            E::Http { status, .. } => Self::Http(*status),
            E::Deserialization { .. } => Self::Decode,
        }
    }
}

/// One resource, one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub resource_id: ResourceId,
    pub observed_at: DateTime<Utc>,
    pub online: bool,
    pub raw_metrics: RawMetrics,
    pub fetch_error: Option<ErrorKind>,
}

impl Snapshot {
    /// A successful observation.
    pub fn observed(
        resource_id: ResourceId,
        observed_at: DateTime<Utc>,
        online: bool,
        raw_metrics: RawMetrics,
    ) -> Self {
        Self {
            resource_id,
            observed_at,
            online,
            raw_metrics,
            fetch_error: None,
        }
    }

    /// A failed poll: offline, no metrics, error recorded.
    pub fn failed(resource_id: ResourceId, observed_at: DateTime<Utc>, kind: ErrorKind) -> Self {
        Self {
            resource_id,
            observed_at,
            online: false,
            raw_metrics: RawMetrics::new(),
            fetch_error: Some(kind),
        }
    }

    pub fn metric(&self, key: &str) -> Option<&RawMetric> {
        self.raw_metrics.get(key)
    }

    /// Non-negative integer metric, rounded and saturating; missing or
    /// non-numeric is `None`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::as_conversions
    )]
    pub fn count(&self, key: &str) -> Option<u32> {
        let value = self.metric(key)?.as_f64()?;
        if !value.is_finite() || value <= 0.0 {
            return Some(0);
        }
        Some(value.round() as u32)
    }

    /// `Some(flag)` when the backend reported the key at all.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.metric(key).map(RawMetric::as_bool)
    }

    /// A JSON integer list stored as text (e.g. `ids_detenidos`).
    pub fn id_list(&self, key: &str) -> Vec<u64> {
        match self.metric(key) {
            Some(RawMetric::Text(raw)) => serde_json::from_str(raw).unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}
