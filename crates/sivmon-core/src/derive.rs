// ── Derivation engine ──
//
// Pure mapping from a raw `Snapshot` to the `DerivedState` a camera card
// shows. Alert precedence is data: an ordered list of rules where the
// first matching rule wins.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::Thresholds;
use crate::model::{AlertType, CongestionLevel, DerivedState, Snapshot};

/// Metric keys reported by `status_full`.
pub mod keys {
    pub const VEHICLES: &str = "vehiculos";
    pub const STOPPED: &str = "detenidos";
    pub const STOPPED_IDS: &str = "ids_detenidos";
    pub const ACCIDENT: &str = "accidente_detectado";
    pub const ASSISTANCE: &str = "asistencia_detectada";
    pub const CONES: &str = "conos_detectados";
    pub const VEHICLE_ALERT: &str = "alerta_vehiculo";
}

/// One `(predicate, AlertType)` pair.
#[derive(Clone, Copy)]
pub struct AlertRule {
    pub alert_type: AlertType,
    pub predicate: fn(&Snapshot) -> bool,
}

impl std::fmt::Debug for AlertRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertRule")
            .field("alert_type", &self.alert_type)
            .finish_non_exhaustive()
    }
}

fn assistance(s: &Snapshot) -> bool {
    s.flag(keys::ASSISTANCE).unwrap_or(false)
}

fn cones(s: &Snapshot) -> bool {
    s.flag(keys::CONES).unwrap_or(false)
}

/// The explicit flag wins; without it, any stopped vehicle raises the alert.
fn stopped_vehicle(s: &Snapshot) -> bool {
    s.flag(keys::VEHICLE_ALERT)
        .unwrap_or_else(|| s.count(keys::STOPPED).unwrap_or(0) > 0)
}

fn accident(s: &Snapshot) -> bool {
    s.flag(keys::ACCIDENT).unwrap_or(false)
}

/// Assistance > Cone > Vehicle > Accident.
pub fn default_alert_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            alert_type: AlertType::Assistance,
            predicate: assistance,
        },
        AlertRule {
            alert_type: AlertType::Cone,
            predicate: cones,
        },
        AlertRule {
            alert_type: AlertType::Vehicle,
            predicate: stopped_vehicle,
        },
        AlertRule {
            alert_type: AlertType::Accident,
            predicate: accident,
        },
    ]
}

#[derive(Debug, Clone)]
pub struct DerivationEngine {
    thresholds: Thresholds,
    rules: Vec<AlertRule>,
    stale_after: Option<Duration>,
}

impl DerivationEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            rules: default_alert_rules(),
            stale_after: None,
        }
    }

    /// Replace the alert rules; order is precedence.
    pub fn with_rules(mut self, rules: Vec<AlertRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Option<Duration>) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// `v > high → High`, `medium < v ≤ high → Medium`, else `Low`.
    pub fn congestion(&self, vehicles: u32) -> CongestionLevel {
        if vehicles > self.thresholds.high {
            CongestionLevel::High
        } else if vehicles > self.thresholds.medium {
            CongestionLevel::Medium
        } else {
            CongestionLevel::Low
        }
    }

    /// First rule whose predicate holds.
    pub fn select_alert(&self, snapshot: &Snapshot) -> Option<AlertType> {
        self.rules
            .iter()
            .find(|rule| (rule.predicate)(snapshot))
            .map(|rule| rule.alert_type)
    }

    /// Deterministic, side-effect free.
    pub fn derive(&self, snapshot: &Snapshot) -> DerivedState {
        if !snapshot.online {
            return DerivedState::offline(
                snapshot.resource_id.clone(),
                snapshot.observed_at,
                snapshot.fetch_error,
            );
        }

        let vehicle_count = snapshot.count(keys::VEHICLES).unwrap_or(0);
        DerivedState {
            resource_id: snapshot.resource_id.clone(),
            online: true,
            congestion_level: self.congestion(vehicle_count),
            active_alert_type: self.select_alert(snapshot),
            stopped_count: snapshot.count(keys::STOPPED).unwrap_or(0),
            vehicle_count,
            stopped_ids: snapshot.id_list(keys::STOPPED_IDS),
            observed_at: snapshot.observed_at,
            fetch_error: snapshot.fetch_error,
        }
    }

    /// `derive`, also treating a snapshot older than `stale_after` as offline.
    pub fn derive_at(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> DerivedState {
        if self.is_stale(snapshot, now) {
            return DerivedState::offline(
                snapshot.resource_id.clone(),
                snapshot.observed_at,
                snapshot.fetch_error,
            );
        }
        self.derive(snapshot)
    }

    pub fn is_stale(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> bool {
        let Some(limit) = self.stale_after else {
            return false;
        };
        (now - snapshot.observed_at)
            .to_std()
            .is_ok_and(|age| age > limit)
    }
}

impl Default for DerivationEngine {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{ErrorKind, RawMetric, RawMetrics, ResourceId};
    use pretty_assertions::assert_eq;

    fn engine(medium: u32, high: u32) -> DerivationEngine {
        DerivationEngine::new(Thresholds::new(medium, high).unwrap())
    }

    fn snapshot(online: bool, metrics: &[(&str, RawMetric)]) -> Snapshot {
        let raw: RawMetrics = metrics
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        Snapshot::observed(ResourceId::from("C1"), Utc::now(), online, raw)
    }

    #[test]
    fn congestion_boundaries_are_exact() {
        let engine = engine(5, 10);
        let table = [
            (0, CongestionLevel::Low),
            (5, CongestionLevel::Low),
            (6, CongestionLevel::Medium),
            (10, CongestionLevel::Medium),
            (11, CongestionLevel::High),
        ];
        for (vehicles, expected) in table {
            assert_eq!(engine.congestion(vehicles), expected, "v={vehicles}");
        }
    }

    #[test]
    fn default_thresholds_match_backend() {
        let engine = DerivationEngine::default();
        assert_eq!(engine.congestion(13), CongestionLevel::Low);
        assert_eq!(engine.congestion(14), CongestionLevel::Medium);
        assert_eq!(engine.congestion(18), CongestionLevel::Medium);
        assert_eq!(engine.congestion(19), CongestionLevel::High);
    }

    #[test]
    fn camera_with_stopped_vehicles_derives_high_vehicle_alert() {
        let s = snapshot(
            true,
            &[
                (keys::VEHICLES, RawMetric::Number(12.0)),
                (keys::STOPPED, RawMetric::Number(2.0)),
            ],
        );
        let derived = engine(5, 10).derive(&s);
        assert_eq!(derived.congestion_level, CongestionLevel::High);
        assert_eq!(derived.active_alert_type, Some(AlertType::Vehicle));
        assert_eq!(derived.stopped_count, 2);
        assert_eq!(derived.vehicle_count, 12);
    }

    #[test]
    fn precedence_picks_a_single_alert() {
        let all = [
            (keys::ACCIDENT, RawMetric::Bool(true)),
            (keys::VEHICLE_ALERT, RawMetric::Bool(true)),
            (keys::CONES, RawMetric::Bool(true)),
            (keys::ASSISTANCE, RawMetric::Bool(true)),
        ];
        let engine = DerivationEngine::default();
        assert_eq!(
            engine.derive(&snapshot(true, &all)).active_alert_type,
            Some(AlertType::Assistance)
        );
        assert_eq!(
            engine.derive(&snapshot(true, &all[..3])).active_alert_type,
            Some(AlertType::Cone)
        );
        assert_eq!(
            engine.derive(&snapshot(true, &all[..2])).active_alert_type,
            Some(AlertType::Vehicle)
        );
        assert_eq!(
            engine.derive(&snapshot(true, &all[..1])).active_alert_type,
            Some(AlertType::Accident)
        );
        assert_eq!(engine.derive(&snapshot(true, &[])).active_alert_type, None);
    }

    #[test]
    fn explicit_false_vehicle_flag_overrides_stopped_count() {
        let s = snapshot(
            true,
            &[
                (keys::STOPPED, RawMetric::Number(3.0)),
                (keys::VEHICLE_ALERT, RawMetric::Bool(false)),
            ],
        );
        let derived = DerivationEngine::default().derive(&s);
        assert_eq!(derived.active_alert_type, None);
        assert_eq!(derived.stopped_count, 3);
    }

    #[test]
    fn offline_hides_stale_metrics() {
        let mut s = snapshot(
            false,
            &[
                (keys::VEHICLES, RawMetric::Number(40.0)),
                (keys::ASSISTANCE, RawMetric::Bool(true)),
                (keys::STOPPED, RawMetric::Number(5.0)),
            ],
        );
        s.fetch_error = Some(ErrorKind::Timeout);
        let derived = DerivationEngine::default().derive(&s);
        assert!(!derived.online);
        assert_eq!(derived.congestion_level, CongestionLevel::Unknown);
        assert_eq!(derived.active_alert_type, None);
        assert_eq!(derived.stopped_count, 0);
        assert_eq!(derived.fetch_error, Some(ErrorKind::Timeout));
    }

    #[test]
    fn old_heartbeat_derives_offline() {
        let engine = DerivationEngine::default().with_stale_after(Some(Duration::from_secs(15)));
        let s = snapshot(true, &[(keys::VEHICLES, RawMetric::Number(20.0))]);

        let fresh = engine.derive_at(&s, s.observed_at + chrono::Duration::seconds(10));
        assert_eq!(fresh.congestion_level, CongestionLevel::High);

        let stale = engine.derive_at(&s, s.observed_at + chrono::Duration::seconds(16));
        assert_eq!(stale.congestion_level, CongestionLevel::Unknown);
        assert!(!stale.online);
    }

    #[test]
    fn custom_rule_order_changes_precedence() {
        let mut rules = default_alert_rules();
        rules.reverse();
        let engine = DerivationEngine::default().with_rules(rules);
        let s = snapshot(
            true,
            &[
                (keys::ACCIDENT, RawMetric::Bool(true)),
                (keys::ASSISTANCE, RawMetric::Bool(true)),
            ],
        );
        assert_eq!(engine.select_alert(&s), Some(AlertType::Accident));
    }
}
