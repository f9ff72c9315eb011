//! Camera command handlers.

use std::fmt::Write as _;

use sivmon_config::Config;
use sivmon_core::{
    CameraMonitor, CoreError, DerivedState, RawMetric, ResourceId, SivClient, Snapshot,
};

use crate::cli::{CamerasArgs, CamerasCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util::{self, Render};
use super::watch;

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: CamerasArgs,
    cfg: &Config,
    client: SivClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let render = Render::new(global, cfg);

    match args.command {
        CamerasCommand::Status { ids } => {
            let monitor_config = util::monitor_config(cfg, &ids)?;
            let titles = watch::titles_of(&monitor_config);
            let settle = watch::first_board_timeout(&monitor_config);
            let monitor = CameraMonitor::new(monitor_config, client)?;

            monitor.start().await;
            let result = match watch::first_board(&monitor, settle).await {
                Ok(states) => watch::print_board(&monitor, &states, &titles, &render),
                Err(e) => Err(e),
            };
            monitor.shutdown().await;
            result
        }

        CamerasCommand::Show { id } => {
            let monitor_config = util::monitor_config(cfg, std::slice::from_ref(&id))?;
            let settle = watch::first_board_timeout(&monitor_config);
            let monitor = CameraMonitor::new(monitor_config, client)?;
            let resource = ResourceId::from(id.as_str());

            monitor.start().await;
            if let Err(e) = monitor.focus(resource.clone()) {
                monitor.shutdown().await;
                return Err(e.into());
            }
            let waited = watch::first_board(&monitor, settle).await;
            let detail = monitor
                .state_of(&resource)
                .map(|state| {
                    CameraDetail::new(&state, monitor.snapshot_of(&resource).as_deref())
                });
            monitor.shutdown().await;
            waited?;

            let detail = detail.ok_or_else(|| CoreError::NotFound {
                entity: "camera".into(),
                identifier: id.clone(),
            })?;
            let out = output::render_single(&render.format, &detail, format_detail, |d| {
                d.state.resource_id.to_string()
            })?;
            output::print_output(&out, render.quiet);
            Ok(())
        }

        CamerasCommand::Start { id } => {
            let monitor = util::camera_monitor(cfg, client, std::slice::from_ref(&id))?;
            monitor.start_camera(&ResourceId::from(id.as_str())).await?;
            output::notice(&format!("Camera {id} started"), render.quiet);
            Ok(())
        }

        CamerasCommand::Stop { id } => {
            let monitor = util::camera_monitor(cfg, client, std::slice::from_ref(&id))?;
            monitor.stop_camera(&ResourceId::from(id.as_str())).await?;
            output::notice(&format!("Camera {id} stopped"), render.quiet);
            Ok(())
        }
    }
}

// ── Detail view ─────────────────────────────────────────────────────

#[derive(serde::Serialize)]
struct CameraDetail {
    state: DerivedState,
    snapshot: Option<Snapshot>,
}

impl CameraDetail {
    fn new(state: &DerivedState, snapshot: Option<&Snapshot>) -> Self {
        Self {
            state: state.clone(),
            snapshot: snapshot.cloned(),
        }
    }
}

fn format_metric(metric: &RawMetric) -> String {
    match metric {
        RawMetric::Bool(b) => b.to_string(),
        RawMetric::Number(n) => n.to_string(),
        RawMetric::Text(t) => t.clone(),
    }
}

fn format_detail(detail: &CameraDetail) -> String {
    let s = &detail.state;
    let mut out = String::new();
    let _ = writeln!(out, "Camera:      {}", s.resource_id);
    let _ = writeln!(out, "Online:      {}", s.online);
    let _ = writeln!(out, "Congestion:  {}", s.congestion_level);
    let _ = writeln!(out, "Vehicles:    {}", s.vehicle_count);
    let _ = writeln!(out, "Stopped:     {}", s.stopped_count);
    if !s.stopped_ids.is_empty() {
        let ids: Vec<String> = s.stopped_ids.iter().map(u64::to_string).collect();
        let _ = writeln!(out, "Stopped ids: {}", ids.join(", "));
    }
    let _ = writeln!(
        out,
        "Alert:       {}",
        s.active_alert_type.map_or("-", |a| a.label())
    );
    if let Some(kind) = s.fetch_error {
        let _ = writeln!(out, "Error:       {kind}");
    }
    let _ = write!(out, "Observed:    {}", util::local_time(s.observed_at));

    if let Some(ref snapshot) = detail.snapshot {
        if !snapshot.raw_metrics.is_empty() {
            let _ = write!(out, "\n\nRaw metrics:");
            for (key, value) in &snapshot.raw_metrics {
                let _ = write!(out, "\n  {key:<24} {}", format_metric(value));
            }
        }
    }
    out
}
