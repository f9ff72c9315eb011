// ── Derived presentation state ──
//
// What a camera card shows: congestion level, a single active alert,
// stopped-vehicle count. Computed from a `Snapshot` by the derivation
// engine and never edited by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::{ErrorKind, ResourceId};

/// Congestion classification. `Unknown` iff the resource is offline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
    Unknown,
}

/// Detector alert categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AlertType {
    Vehicle,
    Accident,
    Cone,
    Assistance,
}

impl AlertType {
    /// Operator-facing label, as the dashboard words it.
    pub fn label(self) -> &'static str {
        match self {
            Self::Vehicle => "Vehículo detenido",
            Self::Accident => "Accidente",
            Self::Cone => "Conos en la vía",
            Self::Assistance => "Asistencia en vía",
        }
    }
}

/// Per-resource presentation facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedState {
    pub resource_id: ResourceId,
    pub online: bool,
    pub congestion_level: CongestionLevel,
    pub active_alert_type: Option<AlertType>,
    pub stopped_count: u32,
    /// Vehicles currently in frame; zero while offline.
    pub vehicle_count: u32,
    /// Tracker ids of stopped vehicles, when the snapshot carried them.
    pub stopped_ids: Vec<u64>,
    pub observed_at: DateTime<Utc>,
    pub fetch_error: Option<ErrorKind>,
}

impl DerivedState {
    /// The offline shape: nothing presented as current.
    pub fn offline(
        resource_id: ResourceId,
        observed_at: DateTime<Utc>,
        fetch_error: Option<ErrorKind>,
    ) -> Self {
        Self {
            resource_id,
            online: false,
            congestion_level: CongestionLevel::Unknown,
            active_alert_type: None,
            stopped_count: 0,
            vehicle_count: 0,
            stopped_ids: Vec::new(),
            observed_at,
            fetch_error,
        }
    }
}

/// Dashboard KPIs over the whole camera pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub active_cameras: usize,
    pub total_cameras: usize,
    pub recent_alerts: usize,
    pub stopped_vehicles: u32,
    /// Vehicles currently in frame across online cameras.
    pub estimated_flow: u32,
}

impl DashboardSummary {
    /// Aggregate derived states. `registered` counts every monitored
    /// camera, including those that have not answered yet.
    pub fn from_states<'a>(
        states: impl IntoIterator<Item = &'a DerivedState>,
        registered: usize,
        recent_alerts: usize,
    ) -> Self {
        let mut summary = Self {
            total_cameras: registered,
            recent_alerts,
            ..Self::default()
        };
        for state in states {
            if state.online {
                summary.active_cameras += 1;
                summary.stopped_vehicles = summary.stopped_vehicles.saturating_add(state.stopped_count);
                summary.estimated_flow = summary.estimated_flow.saturating_add(state.vehicle_count);
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn enums_round_trip_through_strings() {
        assert_eq!(CongestionLevel::High.to_string(), "high");
        assert_eq!(AlertType::from_str("Assistance").ok(), Some(AlertType::Assistance));
    }

    #[test]
    fn summary_counts_only_online_traffic() {
        let now = Utc::now();
        let mut online = DerivedState::offline(ResourceId::from("1"), now, None);
        online.online = true;
        online.congestion_level = CongestionLevel::Medium;
        online.vehicle_count = 14;
        online.stopped_count = 1;
        let offline = DerivedState::offline(ResourceId::from("2"), now, Some(ErrorKind::Network));

        let summary = DashboardSummary::from_states([&online, &offline], 2, 3);
        assert_eq!(
            summary,
            DashboardSummary {
                active_cameras: 1,
                total_cameras: 2,
                recent_alerts: 3,
                stopped_vehicles: 1,
                estimated_flow: 14,
            }
        );
    }

    #[test]
    fn total_includes_cameras_without_a_state() {
        let now = Utc::now();
        let mut online = DerivedState::offline(ResourceId::from("1"), now, None);
        online.online = true;

        let summary = DashboardSummary::from_states([&online], 4, 0);
        assert_eq!(summary.total_cameras, 4);
        assert_eq!(summary.active_cameras, 1);
        assert_eq!(DashboardSummary::from_states(std::iter::empty(), 2, 0).total_cameras, 2);
    }
}
