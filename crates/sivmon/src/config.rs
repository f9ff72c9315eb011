//! CLI configuration: thin wrapper around `sivmon_config`.
//!
//! Loads the shared config and layers `GlobalOpts` flag overrides
//! (--url, --token, --user-id, ...) on top before building a client.

use std::path::PathBuf;

use secrecy::SecretString;

use sivmon_config::{Config, SessionSection};
use sivmon_core::{CoreError, SessionContext, SivClient};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use sivmon_config::{config_path, save_config_to};

/// Path of the config file in effect: `--config-file` or the platform default.
pub fn active_path(global: &GlobalOpts) -> PathBuf {
    global.config_file.clone().unwrap_or_else(config_path)
}

/// Load the config file (missing is fine) and apply flag overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = sivmon_config::load_config_from(&active_path(global))?;
    apply_overrides(&mut cfg, global);
    cfg.validate()?;
    Ok(cfg)
}

/// Load the file alone, without flag overrides, for editing.
pub fn load_for_edit(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(sivmon_config::load_config_from(&active_path(global))?)
}

fn apply_overrides(cfg: &mut Config, global: &GlobalOpts) {
    if let Some(ref url) = global.url {
        cfg.api.base_url.clone_from(url);
    }
    if global.insecure {
        cfg.api.insecure = true;
    }
    if let Some(timeout) = global.timeout {
        cfg.api.timeout_secs = timeout;
    }
    let session = &mut cfg.session;
    if global.user_id.is_some() {
        session.user_id = global.user_id;
    }
    if global.username.is_some() {
        session.username.clone_from(&global.username);
    }
    if global.role.is_some() {
        session.role.clone_from(&global.role);
    }
}

/// Output format: flag, then the config default, then table.
pub fn output_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    if let Some(ref format) = global.output {
        return format.clone();
    }
    match cfg.defaults.output.as_str() {
        "json" => OutputFormat::Json,
        "json-compact" => OutputFormat::JsonCompact,
        "yaml" => OutputFormat::Yaml,
        "plain" => OutputFormat::Plain,
        _ => OutputFormat::Table,
    }
}

fn resolve_session(section: &SessionSection, global: &GlobalOpts) -> Result<SessionContext, CliError> {
    let user = sivmon_config::session_user(section)?;
    let token = match global.token {
        Some(ref token) if !token.trim().is_empty() => SecretString::from(token.clone()),
        _ => sivmon_config::resolve_token(section)?,
    };
    Ok(SessionContext::new(token, user))
}

/// Build an authenticated client for the resolved config.
pub fn build_client(cfg: &Config, global: &GlobalOpts) -> Result<SivClient, CliError> {
    let session = resolve_session(&cfg.session, global)?;
    let base_url = cfg.base_url()?;
    tracing::debug!(url = %base_url, user = %session.user().username, "building client");
    SivClient::new(base_url, session, &cfg.transport())
        .map(|client| client.with_api_prefix(&cfg.api.prefix))
        .map_err(|e| CliError::from(CoreError::from(e)))
}
