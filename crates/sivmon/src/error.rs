//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use sivmon_config::ConfigError;
use sivmon_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the SIV backend: {message}")]
    #[diagnostic(
        code(sivmon::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             Configured with: sivmon config set api.base_url <URL>"
        )
    )]
    ConnectionFailed { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(sivmon::auth_failed),
        help(
            "The token was refused or has expired. Log in again and store the new token:\n\
             sivmon config set-token"
        )
    )]
    AuthFailed { message: String },

    #[error("No API token configured for '{user}'")]
    #[diagnostic(
        code(sivmon::no_credentials),
        help(
            "Store one with: sivmon config set-token\n\
             Or set the SIVMON_TOKEN environment variable."
        )
    )]
    NoCredentials { user: String },

    #[error("No session user configured")]
    #[diagnostic(
        code(sivmon::no_user),
        help(
            "Configure one with: sivmon config init\n\
             Or pass --user-id and --username."
        )
    )]
    NoUser,

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(sivmon::not_found),
        help("Run: sivmon {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Incident commands ────────────────────────────────────────────
    #[error("Missing required fields: {}", fields.join(", "))]
    #[diagnostic(
        code(sivmon::missing_fields),
        help("Nothing was sent. Provide the fields listed above and try again.")
    )]
    MissingFields { fields: Vec<String> },

    #[error("Incident {incident_id} is closed and can no longer change")]
    #[diagnostic(
        code(sivmon::stale_state),
        help("Run: sivmon incidents list to see active incidents")
    )]
    StaleState { incident_id: u64 },

    #[error("The backend rejected the change to incident {incident_id}: {message}")]
    #[diagnostic(
        code(sivmon::conflict),
        help("The local view was rolled back to the last confirmed state.")
    )]
    Conflict { incident_id: u64, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sivmon::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(sivmon::config),
        help("Inspect it with: sivmon config show\nFile: {path}")
    )]
    Config { message: String, path: String },

    // ── Internal / IO ────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(sivmon::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } | Self::NoUser => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } | Self::StaleState { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::MissingFields { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Network { message } => CliError::ConnectionFailed { message },
            CoreError::Auth { message } => CliError::AuthFailed { message },
            CoreError::Validation { fields } => CliError::MissingFields { fields },
            CoreError::StaleState { incident_id } => CliError::StaleState { incident_id },
            CoreError::Conflict {
                incident_id,
                message,
            } => CliError::Conflict {
                incident_id,
                message,
            },
            CoreError::NotFound { entity, identifier } => CliError::NotFound {
                list_command: list_command_for(&entity),
                resource_type: entity,
                identifier,
            },
            CoreError::Config { message } => CliError::Config {
                message,
                path: sivmon_config::config_path().display().to_string(),
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

fn list_command_for(entity: &str) -> String {
    match entity {
        "incident" => "incidents list".into(),
        "camera" => "cameras status".into(),
        "user" => "users list".into(),
        other => format!("{other}s list"),
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { user } => CliError::NoCredentials { user },
            ConfigError::NoUser => CliError::NoUser,
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
                path: sivmon_config::config_path().display().to_string(),
            },
        }
    }
}
