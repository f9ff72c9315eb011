//! Live camera board: derived states, dashboard summary and alerts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;
use tokio::time::Instant;

use sivmon_config::Config;
use sivmon_core::{
    AlertEvent, Cadence, CameraMonitor, DashboardSummary, DerivedState, EntityStream,
    MonitorConfig, ResourceId, SessionState, SivClient,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util::{self, Render};

pub type Titles = HashMap<ResourceId, String>;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct CameraRow {
    #[tabled(rename = "Camera")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Congestion")]
    congestion: String,
    #[tabled(rename = "Vehicles")]
    vehicles: u32,
    #[tabled(rename = "Stopped")]
    stopped: u32,
    #[tabled(rename = "Alert")]
    alert: String,
    #[tabled(rename = "Polling")]
    cadence: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

fn camera_row(
    state: &DerivedState,
    title: &str,
    cadence: Option<Cadence>,
    color: bool,
) -> CameraRow {
    let status = match (state.online, state.fetch_error) {
        (true, _) => "online".to_owned(),
        (false, Some(kind)) => format!("offline ({kind})"),
        (false, None) => "offline".to_owned(),
    };
    CameraRow {
        id: state.resource_id.to_string(),
        title: title.to_owned(),
        status,
        congestion: output::paint_congestion(state.congestion_level, color),
        vehicles: state.vehicle_count,
        stopped: state.stopped_count,
        alert: output::paint_alert(state.active_alert_type, color),
        cadence: cadence.map_or_else(|| "-".into(), |c| c.to_string()),
        updated: util::local_time(state.observed_at),
    }
}

/// Everything one board render shows, in structured form.
#[derive(Serialize)]
pub struct Board {
    pub summary: DashboardSummary,
    pub cameras: Vec<Arc<DerivedState>>,
    pub alerts: Arc<Vec<AlertEvent>>,
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: WatchArgs,
    cfg: &Config,
    client: SivClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let render = Render::new(global, cfg);
    let monitor_config = util::monitor_config(cfg, &args.cameras)?;
    let titles = titles_of(&monitor_config);
    let settle = first_board_timeout(&monitor_config);
    let monitor = CameraMonitor::new(monitor_config, client)?;

    monitor.start().await;
    if let Some(ref id) = args.focus {
        if let Err(e) = monitor.focus(id.as_str()) {
            monitor.shutdown().await;
            return Err(e.into());
        }
    }

    let result = if args.once {
        match first_board(&monitor, settle).await {
            Ok(states) => print_board(&monitor, &states, &titles, &render),
            Err(e) => Err(e),
        }
    } else {
        let deadline = args.duration.map(|d| Instant::now() + d);
        follow(&monitor, &titles, &render, deadline).await
    };

    monitor.shutdown().await;
    result
}

pub fn titles_of(config: &MonitorConfig) -> Titles {
    config
        .cameras
        .iter()
        .map(|c| (c.id.clone(), c.title.clone()))
        .collect()
}

/// Long enough for one poll per camera to succeed or time out.
pub fn first_board_timeout(config: &MonitorConfig) -> Duration {
    config.polling.interval + config.polling.request_timeout + Duration::from_secs(2)
}

/// Wait until every camera that is being polled has reported once.
///
/// Gives up after `timeout` and returns whatever has arrived.
pub async fn first_board(
    monitor: &CameraMonitor,
    timeout: Duration,
) -> Result<Arc<Vec<Arc<DerivedState>>>, CliError> {
    let mut states = monitor.states();
    let mut session = monitor.session_state();
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut latest = states.latest();
    loop {
        if board_complete(monitor, &latest) {
            return Ok(latest);
        }
        tokio::select! {
            () = &mut deadline => {
                tracing::warn!(
                    reported = latest.len(),
                    expected = monitor.cameras().len(),
                    "not every camera reported in time"
                );
                return Ok(latest);
            }
            changed = session.changed() => {
                if changed.is_err() {
                    return Ok(latest);
                }
                check_session(&session.borrow())?;
            }
            next = states.changed() => match next {
                Some(next) => latest = next,
                None => return Ok(latest),
            },
        }
    }
}

fn board_complete(monitor: &CameraMonitor, states: &[Arc<DerivedState>]) -> bool {
    let reported: HashSet<&ResourceId> = states.iter().map(|s| &s.resource_id).collect();
    monitor
        .cameras()
        .iter()
        .filter(|id| monitor.cadence_of(id) != Some(Cadence::Suspended))
        .all(|id| reported.contains(id))
}

fn check_session(state: &SessionState) -> Result<(), CliError> {
    match state {
        SessionState::Invalidated { reason } => Err(CliError::AuthFailed {
            message: reason.clone(),
        }),
        SessionState::Active => Ok(()),
    }
}

async fn follow(
    monitor: &CameraMonitor,
    titles: &Titles,
    render: &Render,
    deadline: Option<Instant>,
) -> Result<(), CliError> {
    let mut states: EntityStream<DerivedState> = monitor.states();
    let mut session = monitor.session_state();
    let mut seen_alerts: HashSet<String> = HashSet::new();

    let stop = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(stop);

    loop {
        tokio::select! {
            () = &mut stop => return Ok(()),
            _ = tokio::signal::ctrl_c() => {
                output::notice("Interrupted", render.quiet);
                return Ok(());
            }
            changed = session.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                check_session(&session.borrow())?;
            }
            next = states.changed() => {
                let Some(snapshot) = next else {
                    return Ok(());
                };
                print_board(monitor, &snapshot, titles, render)?;
                announce_alerts(&monitor.alerts(), &mut seen_alerts, render);
            }
        }
    }
}

// ── Rendering ───────────────────────────────────────────────────────

pub fn print_board(
    monitor: &CameraMonitor,
    states: &[Arc<DerivedState>],
    titles: &Titles,
    render: &Render,
) -> Result<(), CliError> {
    let board = Board {
        summary: monitor.summary(),
        cameras: states.to_vec(),
        alerts: monitor.alerts(),
    };

    let out = match render.format {
        OutputFormat::Table => {
            let table = output::render_list(
                &OutputFormat::Table,
                &board.cameras,
                |s| {
                    let title = titles.get(&s.resource_id).map_or("-", String::as_str);
                    camera_row(s, title, monitor.cadence_of(&s.resource_id), render.color)
                },
                |s| s.resource_id.to_string(),
            )?;
            format!("{table}\n{}", summary_line(&board.summary))
        }
        OutputFormat::Plain => board
            .cameras
            .iter()
            .map(|s| format!("{} {}", s.resource_id, s.congestion_level))
            .collect::<Vec<_>>()
            .join("\n"),
        ref format => output::render_single(format, &board, |_| String::new(), |_| String::new())?,
    };
    output::print_output(&out, render.quiet);
    Ok(())
}

fn summary_line(summary: &DashboardSummary) -> String {
    format!(
        "Active cameras: {}/{}  Stopped vehicles: {}  Estimated flow: {}  Recent alerts: {}",
        summary.active_cameras,
        summary.total_cameras,
        summary.stopped_vehicles,
        summary.estimated_flow,
        summary.recent_alerts
    )
}

/// Print alerts not shown before, oldest first, to stderr.
fn announce_alerts(alerts: &[AlertEvent], seen: &mut HashSet<String>, render: &Render) {
    if render.format != OutputFormat::Table {
        return;
    }
    for alert in alerts.iter().rev() {
        if seen.insert(alert.id.clone()) {
            output::notice(
                &format!(
                    "! {} {} {}",
                    util::local_time(alert.occurred_at),
                    alert.resource_id,
                    alert.alert_type.label()
                ),
                render.quiet,
            );
        }
    }
}
