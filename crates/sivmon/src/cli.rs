//! Clap derive structures for the `sivmon` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand, ValueEnum};

use sivmon_core::{IncidentStatus, Priority};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sivmon -- live camera and incident monitor for the SIV backend
#[derive(Debug, Parser)]
#[command(
    name = "sivmon",
    version,
    about = "Monitor SIV traffic cameras and road incidents from the command line",
    long_about = "Polls SIV traffic cameras, derives congestion and detector alerts,\n\
        and manages the road incident lifecycle (create, edit, close).",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SIVMON_CONFIG_FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Backend base URL (overrides config)
    #[arg(long, short = 'u', env = "SIVMON_URL", global = true)]
    pub url: Option<String>,

    /// Bearer token (overrides keyring and config)
    #[arg(long, env = "SIVMON_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Session user id (overrides config)
    #[arg(long, env = "SIVMON_USER_ID", global = true)]
    pub user_id: Option<u64>,

    /// Session username (overrides config)
    #[arg(long, env = "SIVMON_USERNAME", global = true)]
    pub username: Option<String>,

    /// Session role: admin, supervisor or operador (overrides config)
    #[arg(long, env = "SIVMON_ROLE", global = true)]
    pub role: Option<String>,

    /// Output format
    #[arg(long, short = 'o', env = "SIVMON_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "SIVMON_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides config)
    #[arg(long, env = "SIVMON_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

impl GlobalOpts {
    pub fn format(&self) -> OutputFormat {
        self.output.clone().unwrap_or_default()
    }
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the live camera board: states, summary and new alerts
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Inspect and control cameras
    #[command(alias = "cam", alias = "c")]
    Cameras(CamerasArgs),

    /// Manage road incidents
    #[command(alias = "inc", alias = "i")]
    Incidents(IncidentsArgs),

    /// List backend users
    Users(UsersArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Cameras to watch (repeatable; defaults to the configured list)
    #[arg(long = "camera", short = 'c')]
    pub cameras: Vec<String>,

    /// Poll this camera at the focused cadence
    #[arg(long, short = 'f')]
    pub focus: Option<String>,

    /// Stop after this long (e.g. "90s", "5m")
    #[arg(long, short = 'd', value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Print the first complete board and exit
    #[arg(long)]
    pub once: bool,
}

// ── Cameras ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CamerasArgs {
    #[command(subcommand)]
    pub command: CamerasCommand,
}

#[derive(Debug, Subcommand)]
pub enum CamerasCommand {
    /// Poll cameras once and show their derived state
    #[command(alias = "ls")]
    Status {
        /// Camera ids (defaults to the configured list)
        ids: Vec<String>,
    },

    /// Show the raw metrics and derived state of one camera
    Show {
        /// Camera id
        id: String,
    },

    /// Start a camera's detection pipeline
    Start {
        /// Camera id
        id: String,
    },

    /// Stop a camera's detection pipeline
    Stop {
        /// Camera id
        id: String,
    },
}

// ── Incidents ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct IncidentsArgs {
    #[command(subcommand)]
    pub command: IncidentsCommand,
}

#[derive(Debug, Subcommand)]
pub enum IncidentsCommand {
    /// List incidents visible to the session user
    #[command(alias = "ls")]
    List(IncidentListArgs),

    /// Show one incident
    Get {
        /// Incident id
        id: u64,
    },

    /// Report a new incident
    Create(IncidentFields),

    /// Edit an active incident
    Edit {
        /// Incident id
        id: u64,

        #[command(flatten)]
        fields: IncidentFields,
    },

    /// Close an active incident as the session user
    Close {
        /// Incident id
        id: u64,
    },
}

#[derive(Debug, Args)]
pub struct IncidentListArgs {
    /// Only incidents with this status
    #[arg(long, value_parser = parse_status)]
    pub status: Option<IncidentStatus>,

    /// Only incidents with this priority
    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<Priority>,

    /// Earliest reference date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Latest reference date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Resolve creator and closer names from the user directory
    #[arg(long)]
    pub names: bool,
}

/// Incident form fields. On `create` the required ones are checked
/// before anything is sent; on `edit` only the given ones change.
#[derive(Debug, Clone, Default, Args)]
pub struct IncidentFields {
    /// Incident type (e.g. "Robo", "Accidente")
    #[arg(long = "type", short = 't')]
    pub kind: Option<String>,

    /// Alta, Media or Baja
    #[arg(long, short = 'p', value_parser = parse_priority)]
    pub priority: Option<Priority>,

    /// Camera the incident was seen on
    #[arg(long)]
    pub camera: Option<String>,

    #[arg(long)]
    pub sector: Option<String>,

    /// Affected lanes (repeatable)
    #[arg(long = "pista")]
    pub pista: Vec<String>,

    /// Road works involved (repeatable)
    #[arg(long = "trabajo")]
    pub trabajos_via: Vec<String>,

    /// Free-text observation
    #[arg(long, short = 'm')]
    pub observation: Option<String>,

    #[arg(long)]
    pub ubicacion: Option<String>,

    #[arg(long)]
    pub senalizacion: Option<String>,

    /// Start date (YYYY-MM-DD; create defaults to today)
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Start time (HH:MM[:SS]; create defaults to now)
    #[arg(long, value_parser = parse_time)]
    pub start_time: Option<NaiveTime>,
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    raw.parse()
        .map_err(|_| format!("unknown priority '{raw}' (expected Alta, Media or Baja)"))
}

fn parse_status(raw: &str) -> Result<IncidentStatus, String> {
    raw.parse()
        .map_err(|_| format!("unknown status '{raw}' (expected Activo or Cerrado)"))
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| format!("invalid time '{raw}' (expected HH:MM or HH:MM:SS)"))
}

// ── Users ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct UsersArgs {
    #[command(subcommand)]
    pub command: UsersCommand,
}

#[derive(Debug, Subcommand)]
pub enum UsersCommand {
    /// List users and their roles
    #[command(alias = "ls")]
    List,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create the config file with guided setup
    Init,

    /// Display the resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Set a configuration value
    Set {
        /// Config key (dot-separated, e.g. "polling.interval_secs")
        key: String,

        /// Value to set
        value: String,
    },

    /// Add a camera to the startup list
    AddCamera {
        /// Camera id
        id: String,

        /// Display title
        #[arg(long)]
        title: Option<String>,
    },

    /// Store the API token in the system keyring
    SetToken {
        /// Token value (prompted for when omitted)
        #[arg(long)]
        value: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn time_accepts_minutes_or_seconds() {
        assert_eq!(parse_time("08:15"), Ok(NaiveTime::from_hms_opt(8, 15, 0).unwrap()));
        assert_eq!(parse_time("08:15:30"), Ok(NaiveTime::from_hms_opt(8, 15, 30).unwrap()));
        assert!(parse_time("8h").is_err());
    }

    #[test]
    fn priority_is_case_insensitive() {
        assert_eq!(parse_priority("alta"), Ok(Priority::Alta));
        assert!(parse_priority("urgente").is_err());
    }
}
