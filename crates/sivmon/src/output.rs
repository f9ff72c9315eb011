//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use sivmon_core::{AlertType, CongestionLevel, IncidentStatus, Priority};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Traffic-light coloring for congestion cells.
pub fn paint_congestion(level: CongestionLevel, color: bool) -> String {
    let text = level.to_string();
    if !color {
        return text;
    }
    match level {
        CongestionLevel::Low => text.green().to_string(),
        CongestionLevel::Medium => text.yellow().to_string(),
        CongestionLevel::High => text.red().bold().to_string(),
        CongestionLevel::Unknown => text.dimmed().to_string(),
    }
}

pub fn paint_alert(alert: Option<AlertType>, color: bool) -> String {
    match alert {
        None => "-".into(),
        Some(a) if color => a.label().red().bold().to_string(),
        Some(a) => a.label().into(),
    }
}

pub fn paint_priority(priority: Priority, color: bool) -> String {
    let text = priority.to_string();
    if !color {
        return text;
    }
    match priority {
        Priority::Alta => text.red().to_string(),
        Priority::Media => text.yellow().to_string(),
        Priority::Baja => text.green().to_string(),
    }
}

pub fn paint_status(status: IncidentStatus, color: bool) -> String {
    let text = status.to_string();
    match status {
        IncidentStatus::Activo if color => text.bold().to_string(),
        IncidentStatus::Cerrado if color => text.dimmed().to_string(),
        _ => text,
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, since single-item views are
/// key/value listings rather than rows.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Status line on stderr, suppressed in quiet mode.
pub fn notice(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{message}");
    }
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.map_err(|e| CliError::Internal(format!("JSON serialization failed: {e}")))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    serde_yaml::to_string(data)
        .map_err(|e| CliError::Internal(format!("YAML serialization failed: {e}")))
}
