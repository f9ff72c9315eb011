// ── Runtime monitor configuration ──
//
// These types describe *how* the core polls, derives and logs. They
// never touch disk: the CLI builds a `MonitorConfig` (usually through
// sivmon-config) and hands it in.

use std::time::Duration;

use crate::error::CoreError;
use crate::model::ResourceId;

/// Vehicle-count thresholds for congestion classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub medium: u32,
    pub high: u32,
}

impl Thresholds {
    pub fn new(medium: u32, high: u32) -> Result<Self, CoreError> {
        if medium > high {
            return Err(CoreError::Config {
                message: format!(
                    "medium threshold ({medium}) must not exceed high threshold ({high})"
                ),
            });
        }
        Ok(Self { medium, high })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { medium: 13, high: 18 }
    }
}

/// Poll cadences and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Background cadence.
    pub interval: Duration,
    /// Cadence for the focused resource.
    pub focus_interval: Duration,
    /// A poll running longer than this becomes a `Timeout` failure.
    pub request_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            focus_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertLogSettings {
    pub capacity: usize,
    pub coalescing_window: Duration,
}

impl Default for AlertLogSettings {
    fn default() -> Self {
        Self {
            capacity: 10,
            coalescing_window: Duration::from_secs(30),
        }
    }
}

/// A camera known at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSpec {
    pub id: ResourceId,
    pub title: String,
}

/// Everything `CameraMonitor` and `IncidentBoard` need.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub polling: PollSettings,
    /// Cadence of the incident list refresh.
    pub incident_interval: Duration,
    /// Heartbeat freshness: older snapshots derive as offline. `None`
    /// disables the check.
    pub stale_after: Option<Duration>,
    /// Pause non-focused cameras while one is focused.
    pub suspend_background_on_focus: bool,
    pub thresholds: Thresholds,
    pub alerts: AlertLogSettings,
    pub cameras: Vec<CameraSpec>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            polling: PollSettings::default(),
            incident_interval: Duration::from_secs(10),
            stale_after: Some(Duration::from_secs(15)),
            suspend_background_on_focus: true,
            thresholds: Thresholds::default(),
            alerts: AlertLogSettings::default(),
            cameras: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        Thresholds::new(self.thresholds.medium, self.thresholds.high)?;
        if self.polling.interval.is_zero() || self.polling.focus_interval.is_zero() {
            return Err(CoreError::Config {
                message: "poll intervals must be greater than zero".into(),
            });
        }
        if self.incident_interval.is_zero() {
            return Err(CoreError::Config {
                message: "incident interval must be greater than zero".into(),
            });
        }
        if self.alerts.capacity == 0 {
            return Err(CoreError::Config {
                message: "alert log capacity must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_thresholds_are_rejected() {
        assert!(Thresholds::new(18, 13).is_err());
        assert!(Thresholds::new(10, 10).is_ok());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = MonitorConfig::default();
        config.alerts.capacity = 0;
        assert!(config.validate().is_err());
    }
}
