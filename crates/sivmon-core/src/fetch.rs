// ── Resource fetchers ──
//
// What the poller calls on every tick. One implementation per feed
// kind: cameras produce a reading, the incident feed produces the full
// incident list.

use std::future::Future;

use sivmon_api::{IncidentRecord, SivClient};

use crate::model::{RawMetric, RawMetrics, ResourceId};

/// Detail requested from a fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fidelity {
    /// Scalar counts and flags.
    Standard,
    /// Everything the backend reports, list-valued detail included.
    High,
}

/// A single remote feed the poller can drive.
pub trait ResourceFetcher: Send + Sync + 'static {
    type Output: Send + 'static;

    fn fetch(
        &self,
        id: &ResourceId,
        fidelity: Fidelity,
    ) -> impl Future<Output = Result<Self::Output, sivmon_api::Error>> + Send;
}

// ── Cameras ─────────────────────────────────────────────────────────

/// One camera poll.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraReading {
    pub online: bool,
    pub metrics: RawMetrics,
}

#[derive(Debug, Clone)]
pub struct CameraFetcher {
    client: SivClient,
}

impl CameraFetcher {
    pub fn new(client: SivClient) -> Self {
        Self { client }
    }
}

impl ResourceFetcher for CameraFetcher {
    type Output = CameraReading;

    async fn fetch(
        &self,
        id: &ResourceId,
        fidelity: Fidelity,
    ) -> Result<CameraReading, sivmon_api::Error> {
        let full = self.client.camera_status_full(id.as_str()).await?;
        let online = full.is_online();
        let metrics = full
            .metrics
            .iter()
            .filter(|(_, value)| fidelity == Fidelity::High || !is_compound(value))
            .filter_map(|(key, value)| RawMetric::from_json(value).map(|m| (key.clone(), m)))
            .collect();
        Ok(CameraReading { online, metrics })
    }
}

fn is_compound(value: &serde_json::Value) -> bool {
    value.is_array() || value.is_object()
}

// ── Incidents ───────────────────────────────────────────────────────

/// Resource id of the incident list feed.
pub const INCIDENT_FEED: &str = "incidentes";

#[derive(Debug, Clone)]
pub struct IncidentFetcher {
    client: SivClient,
}

impl IncidentFetcher {
    pub fn new(client: SivClient) -> Self {
        Self { client }
    }
}

impl ResourceFetcher for IncidentFetcher {
    type Output = Vec<IncidentRecord>;

    async fn fetch(
        &self,
        _id: &ResourceId,
        _fidelity: Fidelity,
    ) -> Result<Vec<IncidentRecord>, sivmon_api::Error> {
        self.client.list_incidents().await
    }
}
