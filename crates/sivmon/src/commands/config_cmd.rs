//! Config subcommand handlers.

use std::str::FromStr;

use dialoguer::{Input, Password, Select};

use sivmon_config::{CameraEntry, Config, SessionSection};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

const KEYS: &str = "api.base_url, api.prefix, api.timeout_secs, api.insecure, polling.interval_secs, \
    polling.focus_interval_secs, polling.incident_interval_secs, polling.request_timeout_secs, \
    polling.stale_after_secs, polling.suspend_background_on_focus, thresholds.medium_threshold, \
    thresholds.high_threshold, alerts.capacity, alerts.coalescing_window_secs, session.user_id, \
    session.username, session.role, session.token_env, defaults.output, defaults.color";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of the config with the plaintext token masked.
fn redacted(cfg: &Config) -> Config {
    let mut out = cfg.clone();
    if out.session.token.is_some() {
        out.session.token = Some("****".into());
    }
    out
}

fn format_toml(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# unable to render config: {e}"))
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn parse<T: FromStr>(key: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: key.into(),
        reason: format!("must be {expected}"),
    })
}

/// Apply one `key = value` assignment.
fn set_key(cfg: &mut Config, key: &str, value: &str) -> Result<(), CliError> {
    const SECS: &str = "a whole number of seconds";
    match key {
        "api.base_url" => cfg.api.base_url = value.into(),
        "api.prefix" => cfg.api.prefix = value.into(),
        "api.timeout_secs" => cfg.api.timeout_secs = parse(key, value, SECS)?,
        "api.insecure" => cfg.api.insecure = parse(key, value, "'true' or 'false'")?,
        "polling.interval_secs" => cfg.polling.interval_secs = parse(key, value, SECS)?,
        "polling.focus_interval_secs" => cfg.polling.focus_interval_secs = parse(key, value, SECS)?,
        "polling.incident_interval_secs" => {
            cfg.polling.incident_interval_secs = parse(key, value, SECS)?;
        }
        "polling.request_timeout_secs" => {
            cfg.polling.request_timeout_secs = parse(key, value, SECS)?;
        }
        "polling.stale_after_secs" => cfg.polling.stale_after_secs = parse(key, value, SECS)?,
        "polling.suspend_background_on_focus" => {
            cfg.polling.suspend_background_on_focus = parse(key, value, "'true' or 'false'")?;
        }
        "thresholds.medium_threshold" => {
            cfg.thresholds.medium_threshold = parse(key, value, "a vehicle count")?;
        }
        "thresholds.high_threshold" => {
            cfg.thresholds.high_threshold = parse(key, value, "a vehicle count")?;
        }
        "alerts.capacity" => cfg.alerts.capacity = parse(key, value, "a positive number")?,
        "alerts.coalescing_window_secs" => {
            cfg.alerts.coalescing_window_secs = parse(key, value, SECS)?;
        }
        "session.user_id" => cfg.session.user_id = Some(parse(key, value, "a numeric user id")?),
        "session.username" => cfg.session.username = Some(value.into()),
        "session.role" => {
            if !matches!(value, "admin" | "supervisor" | "operador") {
                return Err(CliError::Validation {
                    field: key.into(),
                    reason: "must be 'admin', 'supervisor' or 'operador'".into(),
                });
            }
            cfg.session.role = Some(value.into());
        }
        "session.token_env" => cfg.session.token_env = Some(value.into()),
        "defaults.output" => {
            if !matches!(value, "table" | "json" | "json-compact" | "yaml" | "plain") {
                return Err(CliError::Validation {
                    field: key.into(),
                    reason: "must be one of table, json, json-compact, yaml, plain".into(),
                });
            }
            cfg.defaults.output = value.into();
        }
        "defaults.color" => cfg.defaults.color = value.into(),
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!("unknown config key '{other}'. Valid keys: {KEYS}"),
            });
        }
    }
    Ok(())
}

fn prompt_token() -> Result<String, CliError> {
    let token = Password::new()
        .with_prompt("API token")
        .interact()
        .map_err(prompt_err)?;
    if token.trim().is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(token)
}

/// Offer to store the token in the system keyring or return it for
/// plaintext config.
fn prompt_token_storage(section: &SessionSection, token: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the token?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        sivmon_config::store_token(section, token)?;
        eprintln!("   ✓ Token stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(token.to_owned()))
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::active_path(global);

    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            eprintln!("sivmon configuration wizard");
            eprintln!("   Config path: {}\n", path.display());

            let base_url: String = Input::new()
                .with_prompt("Backend URL")
                .default("http://localhost:8000".into())
                .interact_text()
                .map_err(prompt_err)?;

            let user_id: u64 = Input::new()
                .with_prompt("Your user id")
                .interact_text()
                .map_err(prompt_err)?;

            let username: String = Input::new()
                .with_prompt("Username")
                .interact_text()
                .map_err(prompt_err)?;

            let roles = &["operador", "supervisor", "admin"];
            let role = Select::new()
                .with_prompt("Role")
                .items(roles)
                .default(0)
                .interact()
                .map_err(prompt_err)?;

            let mut cfg = Config::default();
            cfg.api.base_url = base_url;
            cfg.session = SessionSection {
                user_id: Some(user_id),
                username: Some(username),
                role: roles.get(role).map(|r| (*r).to_owned()),
                ..SessionSection::default()
            };
            cfg.validate()?;

            let token = prompt_token()?;
            cfg.session.token = prompt_token_storage(&cfg.session, &token)?;

            config::save_config_to(&cfg, &path)?;
            eprintln!("\n✓ Configuration written to {}", path.display());
            eprintln!("\n  Add cameras with: sivmon config add-camera <ID>");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&config::load_for_edit(global)?);
            let format = config::output_format(global, &cfg);
            let out = output::render_single(&format, &cfg, format_toml, |_| {
                path.display().to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_for_edit(global)?;
            set_key(&mut cfg, &key, &value)?;
            cfg.validate()?;
            config::save_config_to(&cfg, &path)?;
            output::notice(&format!("✓ Set {key}"), global.quiet);
            Ok(())
        }

        ConfigCommand::AddCamera { id, title } => {
            let mut cfg = config::load_for_edit(global)?;
            let id = id.trim().to_owned();
            if let Some(existing) = cfg.cameras.iter_mut().find(|c| c.id == id) {
                existing.title = title;
            } else {
                cfg.cameras.push(CameraEntry {
                    id: id.clone(),
                    title,
                });
            }
            cfg.validate()?;
            config::save_config_to(&cfg, &path)?;
            output::notice(&format!("✓ Camera {id} saved"), global.quiet);
            Ok(())
        }

        // ── Token ───────────────────────────────────────────────────
        ConfigCommand::SetToken { value } => {
            let cfg = config::load_for_edit(global)?;
            let token = match value {
                Some(v) if !v.trim().is_empty() => v,
                _ => prompt_token()?,
            };
            sivmon_config::store_token(&cfg.session, &token)?;
            output::notice("✓ Token stored in system keyring", global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_key_updates_nested_sections() {
        let mut cfg = Config::default();
        set_key(&mut cfg, "polling.interval_secs", "3").unwrap();
        set_key(&mut cfg, "thresholds.high_threshold", "25").unwrap();
        set_key(&mut cfg, "session.role", "supervisor").unwrap();
        set_key(&mut cfg, "api.prefix", "/siv/api").unwrap();
        assert_eq!(cfg.polling.interval_secs, 3);
        assert_eq!(cfg.api.prefix, "/siv/api");
        assert_eq!(cfg.thresholds.high_threshold, 25);
        assert_eq!(cfg.session.role.as_deref(), Some("supervisor"));
    }

    #[test]
    fn set_key_rejects_bad_values_and_unknown_keys() {
        let mut cfg = Config::default();
        assert!(matches!(
            set_key(&mut cfg, "polling.interval_secs", "soon"),
            Err(CliError::Validation { .. })
        ));
        assert!(matches!(
            set_key(&mut cfg, "session.role", "root"),
            Err(CliError::Validation { .. })
        ));
        assert!(matches!(
            set_key(&mut cfg, "cameras", "C1"),
            Err(CliError::Validation { .. })
        ));
    }

    #[test]
    fn redaction_masks_plaintext_token() {
        let mut cfg = Config::default();
        cfg.session.token = Some("secret".into());
        let shown = format_toml(&redacted(&cfg));
        assert!(!shown.contains("secret"));
        assert!(shown.contains("****"));
    }
}
