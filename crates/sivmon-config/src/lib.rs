//! Configuration for the sivmon CLI.
//!
//! One TOML file plus `SIVMON_`-prefixed environment overrides, token
//! resolution (env + keyring + plaintext), session user, and translation to
//! `sivmon_core::MonitorConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sivmon_core::{
    AlertLogSettings, CameraSpec, MonitorConfig, PollSettings, ResourceId, Role,
    SessionUser, Thresholds, TransportConfig,
};

const KEYRING_SERVICE: &str = "sivmon";
const DEFAULT_TOKEN_ENV: &str = "SIVMON_TOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API token configured for '{user}'")]
    NoCredentials { user: String },

    #[error("no session user configured (set [session] user_id and username)")]
    NoUser,

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub polling: PollingSection,

    #[serde(default)]
    pub thresholds: ThresholdSection,

    #[serde(default)]
    pub alerts: AlertSection,

    /// Cameras watched on startup.
    #[serde(default)]
    pub cameras: Vec<CameraEntry>,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiSection {
    /// Backend base URL; a path prefix is kept.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path prefix every endpoint is mounted under.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Accept self-signed certificates.
    #[serde(default)]
    pub insecure: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            prefix: default_prefix(),
            timeout_secs: default_timeout(),
            insecure: false,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}
fn default_prefix() -> String {
    sivmon_core::DEFAULT_API_PREFIX.into()
}
fn default_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollingSection {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_focus_interval")]
    pub focus_interval_secs: u64,

    #[serde(default = "default_incident_interval")]
    pub incident_interval_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Snapshots older than this derive as offline. `0` disables.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    #[serde(default = "default_true")]
    pub suspend_background_on_focus: bool,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            focus_interval_secs: default_focus_interval(),
            incident_interval_secs: default_incident_interval(),
            request_timeout_secs: default_request_timeout(),
            stale_after_secs: default_stale_after(),
            suspend_background_on_focus: true,
        }
    }
}

fn default_interval() -> u64 {
    5
}
fn default_focus_interval() -> u64 {
    2
}
fn default_incident_interval() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    4
}
fn default_stale_after() -> u64 {
    15
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ThresholdSection {
    #[serde(default = "default_medium")]
    pub medium_threshold: u32,

    #[serde(default = "default_high")]
    pub high_threshold: u32,
}

impl Default for ThresholdSection {
    fn default() -> Self {
        Self {
            medium_threshold: default_medium(),
            high_threshold: default_high(),
        }
    }
}

fn default_medium() -> u32 {
    13
}
fn default_high() -> u32 {
    18
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AlertSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_window")]
    pub coalescing_window_secs: u64,
}

impl Default for AlertSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            coalescing_window_secs: default_window(),
        }
    }
}

fn default_capacity() -> usize {
    10
}
fn default_window() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CameraEntry {
    pub id: String,
    pub title: Option<String>,
}

/// Who the CLI acts as, and where its token comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionSection {
    pub user_id: Option<u64>,
    pub username: Option<String>,
    /// `admin`, `supervisor` or `operador`.
    pub role: Option<String>,

    /// Environment variable holding the token (default `SIVMON_TOKEN`).
    pub token_env: Option<String>,

    /// Plaintext token. Prefer the keyring or an environment variable.
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("cl", "siv", "sivmon").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("sivmon");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading & saving ────────────────────────────────────────────────

/// Defaults, then `path` (if present), then `SIVMON_` variables with
/// `__` separating sections (`SIVMON_POLLING__INTERVAL_SECS=3`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SIVMON_").split("__"))
        .extract()?;
    Ok(config)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.thresholds.medium_threshold > self.thresholds.high_threshold {
            return Err(invalid(
                "thresholds",
                format!(
                    "medium_threshold ({}) must not exceed high_threshold ({})",
                    self.thresholds.medium_threshold, self.thresholds.high_threshold
                ),
            ));
        }
        let p = &self.polling;
        for (field, value) in [
            ("polling.interval_secs", p.interval_secs),
            ("polling.focus_interval_secs", p.focus_interval_secs),
            ("polling.incident_interval_secs", p.incident_interval_secs),
            ("polling.request_timeout_secs", p.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.alerts.capacity == 0 {
            return Err(invalid("alerts.capacity", "must be at least 1"));
        }
        let mut seen = std::collections::HashSet::new();
        for camera in &self.cameras {
            let id = camera.id.trim();
            if id.is_empty() {
                return Err(invalid("cameras.id", "must not be empty"));
            }
            if !seen.insert(id) {
                return Err(invalid("cameras.id", format!("duplicate camera '{id}'")));
            }
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<url::Url, ConfigError> {
        self.api
            .base_url
            .parse()
            .map_err(|_| invalid("api.base_url", format!("invalid URL: {}", self.api.base_url)))
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(self.api.timeout_secs),
            accept_invalid_certs: self.api.insecure,
            ..TransportConfig::default()
        }
    }

    /// Translate to the core's runtime configuration.
    pub fn to_monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        self.validate()?;
        let p = &self.polling;
        let thresholds =
            Thresholds::new(self.thresholds.medium_threshold, self.thresholds.high_threshold)
                .map_err(|e| invalid("thresholds", e.to_string()))?;

        Ok(MonitorConfig {
            polling: PollSettings {
                interval: Duration::from_secs(p.interval_secs),
                focus_interval: Duration::from_secs(p.focus_interval_secs),
                request_timeout: Duration::from_secs(p.request_timeout_secs),
            },
            incident_interval: Duration::from_secs(p.incident_interval_secs),
            stale_after: (p.stale_after_secs > 0).then(|| Duration::from_secs(p.stale_after_secs)),
            suspend_background_on_focus: p.suspend_background_on_focus,
            thresholds,
            alerts: AlertLogSettings {
                capacity: self.alerts.capacity,
                coalescing_window: Duration::from_secs(self.alerts.coalescing_window_secs),
            },
            cameras: self
                .cameras
                .iter()
                .map(|c| CameraSpec {
                    id: ResourceId::from(c.id.as_str()),
                    title: c.title.clone().unwrap_or_else(|| c.id.clone()),
                })
                .collect(),
        })
    }
}

// ── Session resolution ──────────────────────────────────────────────

pub fn session_user(section: &SessionSection) -> Result<SessionUser, ConfigError> {
    let (Some(id), Some(username)) = (section.user_id, section.username.as_ref()) else {
        return Err(ConfigError::NoUser);
    };
    Ok(SessionUser {
        id,
        username: username.clone(),
        role: section
            .role
            .as_deref()
            .map_or(Role::Operator, Role::from),
    })
}

/// Resolve the bearer token: env var, then keyring, then plaintext.
pub fn resolve_token(section: &SessionSection) -> Result<SecretString, ConfigError> {
    let env_name = section.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
    if let Ok(val) = std::env::var(env_name) {
        if !val.trim().is_empty() {
            return Ok(SecretString::from(val));
        }
    }

    let account = keyring_account(section);
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &account) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    if let Some(ref token) = section.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials { user: account })
}

/// Store a token in the system keyring for the configured user.
pub fn store_token(section: &SessionSection, token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_account(section))
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

fn keyring_account(section: &SessionSection) -> String {
    format!(
        "{}/token",
        section.username.as_deref().unwrap_or("default")
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.polling, PollingSection::default());
        assert_eq!(cfg.api.prefix, "/api");
        assert_eq!(cfg.thresholds.medium_threshold, 13);
        assert_eq!(cfg.thresholds.high_threshold, 18);
        assert_eq!(cfg.alerts.capacity, 10);
    }

    #[test]
    fn file_overrides_translate_to_monitor_config() {
        let (_dir, path) = write(
            r#"
            [api]
            base_url = "https://siv.example.cl/backend/"
            prefix = "/v2"

            [polling]
            interval_secs = 3
            stale_after_secs = 0
            suspend_background_on_focus = false

            [thresholds]
            medium_threshold = 5
            high_threshold = 10

            [[cameras]]
            id = "C1"
            title = "Acceso Norte"

            [[cameras]]
            id = "C2"
            "#,
        );
        let cfg = load_config_from(&path).unwrap();
        let monitor = cfg.to_monitor_config().unwrap();

        assert_eq!(monitor.polling.interval, Duration::from_secs(3));
        assert_eq!(monitor.polling.focus_interval, Duration::from_secs(2));
        assert_eq!(monitor.stale_after, None);
        assert!(!monitor.suspend_background_on_focus);
        assert_eq!(monitor.thresholds, Thresholds { medium: 5, high: 10 });
        assert_eq!(monitor.cameras.len(), 2);
        assert_eq!(monitor.cameras[1].title, "C2");
        assert_eq!(cfg.base_url().unwrap().path(), "/backend/");
        assert_eq!(cfg.api.prefix, "/v2");
    }

    #[test]
    fn inverted_thresholds_are_a_validation_error() {
        let (_dir, path) = write(
            r"
            [thresholds]
            medium_threshold = 20
            high_threshold = 10
            ",
        );
        let cfg = load_config_from(&path).unwrap();
        assert!(matches!(
            cfg.to_monitor_config(),
            Err(ConfigError::Validation { ref field, .. }) if field == "thresholds"
        ));
    }

    #[test]
    fn duplicate_cameras_are_rejected() {
        let cfg = Config {
            cameras: vec![
                CameraEntry { id: "C1".into(), title: None },
                CameraEntry { id: " C1 ".into(), title: None },
            ],
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let mut cfg = Config::default();
        cfg.api.base_url = "not a url".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.session.username = Some("ana".into());
        cfg.cameras.push(CameraEntry {
            id: "C7".into(),
            title: Some("Túnel".into()),
        });
        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }

    #[test]
    fn session_user_requires_id_and_name() {
        assert!(matches!(
            session_user(&SessionSection::default()),
            Err(ConfigError::NoUser)
        ));
        let user = session_user(&SessionSection {
            user_id: Some(7),
            username: Some("ana".into()),
            role: Some("Administrador".into()),
            ..SessionSection::default()
        })
        .unwrap();
        assert_eq!(user.role, Role::Admin);

        let default_role = session_user(&SessionSection {
            user_id: Some(8),
            username: Some("luis".into()),
            ..SessionSection::default()
        })
        .unwrap();
        assert_eq!(default_role.role, Role::Operator);
    }

    #[test]
    fn plaintext_token_is_the_last_resort() {
        let section = SessionSection {
            username: Some("sivmon-test-user-without-keyring".into()),
            token_env: Some("SIVMON_TEST_TOKEN_THAT_IS_NEVER_SET".into()),
            token: Some("plain".into()),
            ..SessionSection::default()
        };
        assert_eq!(resolve_token(&section).unwrap().expose_secret(), "plain");

        let without = SessionSection {
            token: None,
            ..section
        };
        assert!(matches!(
            resolve_token(&without),
            Err(ConfigError::NoCredentials { .. })
        ));
    }
}
