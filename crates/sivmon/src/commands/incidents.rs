//! Incident command handlers.

use std::collections::BTreeSet;

use chrono::{Local, SubsecRound};
use tabled::Tabled;

use sivmon_config::Config;
use sivmon_core::{
    CoreError, Incident, IncidentBoard, IncidentDraft, IncidentEdit, IncidentFilter, SivClient,
};

use crate::cli::{GlobalOpts, IncidentFields, IncidentListArgs, IncidentsArgs, IncidentsCommand};
use crate::error::CliError;
use crate::output;

use super::util::{self, Render};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct IncidentRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Camera")]
    camera: String,
    #[tabled(rename = "Sector")]
    sector: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "Created by")]
    created_by: String,
    #[tabled(rename = "Closed by")]
    closed_by: String,
}

fn incident_row(i: &Incident, color: bool) -> IncidentRow {
    IncidentRow {
        id: i.id,
        kind: i.kind.clone(),
        priority: output::paint_priority(i.priority, color),
        status: output::paint_status(i.status, color),
        camera: util::or_dash(i.camera.as_deref()),
        sector: util::or_dash(i.sector.as_deref()),
        start: start_of(i),
        created_by: person(i.created_by_name.as_deref(), i.created_by),
        closed_by: person(i.closed_by_name.as_deref(), i.closed_by),
    }
}

fn start_of(i: &Incident) -> String {
    match (i.start_date, i.start_time) {
        (Some(d), Some(t)) => format!("{d} {}", t.format("%H:%M")),
        (Some(d), None) => d.to_string(),
        _ => "-".into(),
    }
}

fn person(name: Option<&str>, id: Option<u64>) -> String {
    match (name, id) {
        (Some(name), _) => name.to_owned(),
        (None, Some(id)) => format!("#{id}"),
        (None, None) => "-".into(),
    }
}

fn join(set: &BTreeSet<String>) -> String {
    if set.is_empty() {
        "-".into()
    } else {
        set.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

fn detail(i: &Incident) -> String {
    let mut lines = vec![
        format!("ID:           {}", i.id),
        format!("Type:         {}", i.kind),
        format!("Priority:     {}", i.priority),
        format!("Status:       {}", i.status),
        format!("Camera:       {}", util::or_dash(i.camera.as_deref())),
        format!("Sector:       {}", util::or_dash(i.sector.as_deref())),
        format!("Lanes:        {}", join(&i.pista)),
        format!("Road works:   {}", join(&i.trabajos_via)),
        format!("Location:     {}", util::or_dash(i.ubicacion_via.as_deref())),
        format!("Signage:      {}", util::or_dash(i.senalizacion.as_deref())),
        format!("Observation:  {}", util::or_dash(i.observation.as_deref())),
        format!("Start:        {}", start_of(i)),
        format!("Created:      {}", util::local_datetime(i.created_at)),
        format!(
            "Created by:   {}",
            person(i.created_by_name.as_deref(), i.created_by)
        ),
    ];
    if !i.is_active() {
        let end = match (i.end_date, i.end_time) {
            (Some(d), Some(t)) => format!("{d} {}", t.format("%H:%M")),
            (Some(d), None) => d.to_string(),
            _ => "-".into(),
        };
        lines.push(format!("End:          {end}"));
        lines.push(format!("Closed:       {}", util::local_datetime(i.closed_at)));
        lines.push(format!(
            "Closed by:    {}",
            person(i.closed_by_name.as_deref(), i.closed_by)
        ));
    }
    lines.join("\n")
}

// ── Form translation ────────────────────────────────────────────────

/// Create form: unset start date/time default to now.
fn draft_from(fields: IncidentFields) -> IncidentDraft {
    let now = Local::now().trunc_subsecs(0);
    IncidentDraft {
        kind: fields.kind,
        priority: fields.priority,
        camera: fields.camera,
        sector: fields.sector,
        pista: fields.pista.into_iter().collect(),
        trabajos_via: fields.trabajos_via.into_iter().collect(),
        observation: fields.observation,
        ubicacion_via: fields.ubicacion,
        senalizacion: fields.senalizacion,
        start_date: fields.start_date.or(Some(now.date_naive())),
        start_time: fields.start_time.or(Some(now.time())),
    }
}

fn edit_from(fields: IncidentFields) -> IncidentEdit {
    let set = |values: Vec<String>| {
        (!values.is_empty()).then(|| values.into_iter().collect::<BTreeSet<_>>())
    };
    IncidentEdit {
        kind: fields.kind,
        priority: fields.priority,
        camera: fields.camera,
        sector: fields.sector,
        pista: set(fields.pista),
        trabajos_via: set(fields.trabajos_via),
        observation: fields.observation,
        ubicacion_via: fields.ubicacion,
        senalizacion: fields.senalizacion,
        start_date: fields.start_date,
        start_time: fields.start_time,
    }
}

fn filter_from(args: &IncidentListArgs) -> IncidentFilter {
    IncidentFilter {
        status: args.status,
        priority: args.priority,
        from: args.from,
        to: args.to,
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: IncidentsArgs,
    cfg: &Config,
    client: SivClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let render = Render::new(global, cfg);
    let board = IncidentBoard::new(&cfg.to_monitor_config()?, client)?;

    match args.command {
        IncidentsCommand::List(list) => {
            board.refresh().await?;
            if list.names {
                resolve_names(&board).await;
            }
            let incidents = board.filtered(&filter_from(&list));
            let out = output::render_list(
                &render.format,
                &incidents,
                |i| incident_row(i, render.color),
                |i| i.id.to_string(),
            )?;
            output::print_output(&out, render.quiet);
            Ok(())
        }

        IncidentsCommand::Get { id } => {
            board.refresh().await?;
            resolve_names(&board).await;
            let incident = board
                .visible()
                .into_iter()
                .find(|i| i.id == id)
                .ok_or_else(|| not_found(id))?;
            print_incident(&incident, &render)
        }

        IncidentsCommand::Create(fields) => {
            let incident = board.create(draft_from(fields)).await?;
            output::notice(&format!("Incident {} created", incident.id), render.quiet);
            print_incident(&incident, &render)
        }

        IncidentsCommand::Edit { id, fields } => {
            let edit = edit_from(fields);
            if edit.is_empty() {
                return Err(CliError::Validation {
                    field: "fields".into(),
                    reason: "nothing to change; pass at least one field flag".into(),
                });
            }
            board.refresh().await?;
            let incident = board.edit(id, edit).await?;
            output::notice(&format!("Incident {id} updated"), render.quiet);
            print_incident(&incident, &render)
        }

        IncidentsCommand::Close { id } => {
            board.refresh().await?;
            if board.get(id).is_none() {
                return Err(not_found(id));
            }
            if !util::confirm(&format!("Close incident {id}?"), global.yes)? {
                return Ok(());
            }
            let incident = board.close(id).await?;
            output::notice(&format!("Incident {id} closed"), render.quiet);
            print_incident(&incident, &render)
        }
    }
}

/// Names are a nicety; a directory the session cannot read is not fatal.
async fn resolve_names(board: &IncidentBoard) {
    if let Err(e) = board.refresh_users().await {
        tracing::debug!(error = %e, "user directory unavailable");
    }
}

fn not_found(id: u64) -> CliError {
    CliError::from(CoreError::NotFound {
        entity: "incident".into(),
        identifier: id.to_string(),
    })
}

fn print_incident(incident: &Incident, render: &Render) -> Result<(), CliError> {
    let out = output::render_single(&render.format, incident, detail, |i| i.id.to_string())?;
    output::print_output(&out, render.quiet);
    Ok(())
}
