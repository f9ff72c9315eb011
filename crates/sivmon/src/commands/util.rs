//! Shared helpers for command handlers.

use chrono::{DateTime, Local, Utc};

use sivmon_config::Config;
use sivmon_core::{CameraMonitor, MonitorConfig, ResourceId, SivClient};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

/// Formatting choices resolved once per command.
pub struct Render {
    pub format: crate::cli::OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

impl Render {
    pub fn new(global: &GlobalOpts, cfg: &Config) -> Self {
        Self {
            format: config::output_format(global, cfg),
            color: output::should_color(&global.color),
            quiet: global.quiet,
        }
    }
}

/// Monitor config for `ids`, or for the configured cameras when empty.
pub fn monitor_config(cfg: &Config, ids: &[String]) -> Result<MonitorConfig, CliError> {
    let mut monitor = cfg.to_monitor_config()?;
    if !ids.is_empty() {
        let titles: std::collections::HashMap<ResourceId, String> = monitor
            .cameras
            .iter()
            .map(|c| (c.id.clone(), c.title.clone()))
            .collect();
        monitor.cameras = ids
            .iter()
            .map(|id| {
                let id = ResourceId::from(id.as_str());
                sivmon_core::CameraSpec {
                    title: titles.get(&id).cloned().unwrap_or_else(|| id.to_string()),
                    id,
                }
            })
            .collect();
    }
    if monitor.cameras.is_empty() {
        return Err(CliError::Validation {
            field: "camera".into(),
            reason: "no cameras configured; pass --camera or run: sivmon config add-camera <ID>"
                .into(),
        });
    }
    Ok(monitor)
}

/// Build a camera monitor for the given ids, not yet started.
pub fn camera_monitor(
    cfg: &Config,
    client: SivClient,
    ids: &[String],
) -> Result<CameraMonitor, CliError> {
    let monitor_config = monitor_config(cfg, ids)?;
    Ok(CameraMonitor::new(monitor_config, client)?)
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Local wall-clock rendering for timestamps.
pub fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

pub fn local_datetime(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "-".into(),
        |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}

pub fn or_dash(value: Option<&str>) -> String {
    value.map_or_else(|| "-".into(), str::to_owned)
}
