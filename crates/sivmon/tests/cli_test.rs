//! Integration tests for the `sivmon` CLI binary.
//!
//! Argument parsing, help output and config handling run without a
//! backend; the remaining tests point the binary at a wiremock server
//! through a temporary config file.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `sivmon` binary with env isolation.
///
/// Clears `SIVMON_*` variables and points config directories at `home`
/// so tests never touch the user's real configuration or keyring.
fn sivmon_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("sivmon");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    for var in [
        "SIVMON_CONFIG_FILE",
        "SIVMON_URL",
        "SIVMON_TOKEN",
        "SIVMON_USER_ID",
        "SIVMON_USERNAME",
        "SIVMON_ROLE",
        "SIVMON_OUTPUT",
        "SIVMON_INSECURE",
        "SIVMON_TIMEOUT",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Config file wired to `server` as operator `ana` (id 7).
fn write_config(dir: &TempDir, server: &MockServer) -> PathBuf {
    let path = dir.path().join("sivmon.toml");
    let body = format!(
        r#"
[api]
base_url = "{}"
timeout_secs = 5

[polling]
interval_secs = 1
focus_interval_secs = 1
request_timeout_secs = 2

[thresholds]
medium_threshold = 5
high_threshold = 10

[session]
user_id = 7
username = "ana"
role = "operador"
"#,
        server.uri()
    );
    std::fs::write(&path, body).unwrap();
    path
}

/// Run against the mock backend. The binary blocks, so it runs off the
/// runtime thread that serves the mocks.
async fn run(home: &Path, config: &Path, args: &[&str]) -> std::process::Output {
    let mut cmd = sivmon_cmd(home);
    cmd.arg("--config-file")
        .arg(config)
        .args(["--token", "tok"])
        .args(args);
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

fn incident(id: u64, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "Robo",
        "priority": "Alta",
        "status": status,
        "camera": "C1",
        "start_date": "2025-03-01",
        "start_time": "08:15:00",
        "created_by_id": 3
    })
}

async fn mount_incidents(server: &MockServer) {
    let mut closed_a = incident(4, "Cerrado");
    closed_a["close_by_id"] = json!(9);
    let mut closed_b = incident(5, "Cerrado");
    closed_b["close_by_id"] = json!(9);
    Mock::given(method("GET"))
        .and(path("/api/incidentes/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            incident(1, "Activo"),
            incident(2, "Activo"),
            incident(3, "Activo"),
            closed_a,
            closed_b,
        ])))
        .mount(server)
        .await;
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = TempDir::new().unwrap();
    let output = sivmon_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = TempDir::new().unwrap();
    sivmon_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("traffic cameras")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("incidents"))
            .and(predicate::str::contains("cameras")),
    );
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    sivmon_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sivmon"));
}

#[test]
fn test_incidents_subcommands_exist() {
    let home = TempDir::new().unwrap();
    sivmon_cmd(home.path())
        .args(["incidents", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("create"))
                .and(predicate::str::contains("edit"))
                .and(predicate::str::contains("close")),
        );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = TempDir::new().unwrap();
    sivmon_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let home = TempDir::new().unwrap();
    sivmon_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_follows_flag() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("custom.toml");
    sivmon_cmd(home.path())
        .arg("--config-file")
        .arg(&file)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_set_then_show() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("sivmon.toml");

    sivmon_cmd(home.path())
        .arg("--config-file")
        .arg(&file)
        .args(["config", "set", "polling.interval_secs", "3"])
        .assert()
        .success();
    sivmon_cmd(home.path())
        .arg("--config-file")
        .arg(&file)
        .args(["config", "add-camera", "C1", "--title", "Acceso Norte"])
        .assert()
        .success();

    let output = sivmon_cmd(home.path())
        .arg("--config-file")
        .arg(&file)
        .args(["--output", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["polling"]["interval_secs"], 3);
    assert_eq!(shown["cameras"][0]["id"], "C1");
    assert_eq!(shown["cameras"][0]["title"], "Acceso Norte");
}

#[test]
fn test_config_set_rejects_inverted_thresholds() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("sivmon.toml");
    let output = sivmon_cmd(home.path())
        .arg("--config-file")
        .arg(&file)
        .args(["config", "set", "thresholds.medium_threshold", "40"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("medium_threshold"));
    assert!(!file.exists(), "invalid config must not be written");
}

#[test]
fn test_config_set_unknown_key() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("sivmon.toml");
    let output = sivmon_cmd(home.path())
        .arg("--config-file")
        .arg(&file)
        .args(["config", "set", "nonsense", "1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("unknown config key"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let home = TempDir::new().unwrap();
    let output = sivmon_cmd(home.path()).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_incidents_without_session_user() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("empty.toml");
    let output = sivmon_cmd(home.path())
        .arg("--config-file")
        .arg(&file)
        .args(["--token", "tok", "incidents", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("No session user configured"));
}

#[test]
fn test_invalid_priority_value() {
    let home = TempDir::new().unwrap();
    let output = sivmon_cmd(home.path())
        .args(["incidents", "create", "--priority", "urgente"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("unknown priority"));
}

// ── Against a mock backend ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_operator_lists_active_incidents_only() {
    let server = MockServer::start().await;
    mount_incidents(&server).await;
    let home = TempDir::new().unwrap();
    let config = write_config(&home, &server);

    let output = run(home.path(), &config, &["-o", "plain", "incidents", "list"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1\n2\n3");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_supervisor_filters_closed_incidents() {
    let server = MockServer::start().await;
    mount_incidents(&server).await;
    let home = TempDir::new().unwrap();
    let config = write_config(&home, &server);

    let output = run(
        home.path(),
        &config,
        &["--role", "supervisor", "-o", "plain", "incidents", "list", "--status", "cerrado"],
    )
    .await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "4\n5");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_incident_as_session_user() {
    let server = MockServer::start().await;
    mount_incidents(&server).await;
    let mut closed = incident(2, "Cerrado");
    closed["close_by_id"] = json!(7);
    closed["closed_at"] = json!("2025-03-01T09:00:00");
    Mock::given(method("PATCH"))
        .and(path("/api/incidentes/cerrar/2/"))
        .and(wiremock::matchers::body_partial_json(json!({ "close_by_id": 7 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(closed))
        .expect(1)
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();
    let config = write_config(&home, &server);

    let output = run(home.path(), &config, &["--yes", "-o", "json", "incidents", "close", "2"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["status"], "Cerrado");
    assert_eq!(body["closed_by"], 7);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_close_exits_with_conflict() {
    let server = MockServer::start().await;
    mount_incidents(&server).await;
    Mock::given(method("PATCH"))
        .and(path("/api/incidentes/cerrar/1/"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "detail": "incidente bloqueado" })),
        )
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();
    let config = write_config(&home, &server);

    let output = run(home.path(), &config, &["--yes", "incidents", "close", "1"]).await;
    assert_eq!(output.status.code(), Some(6), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("incidente bloqueado"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_with_missing_fields_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/incidentes/"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();
    let config = write_config(&home, &server);

    let output = run(home.path(), &config, &["incidents", "create", "--type", "Robo"]).await;
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("priority") && text.contains("camera"), "{text}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expired_token_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/incidentes/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "expired" })))
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();
    let config = write_config(&home, &server);

    let output = run(home.path(), &config, &["incidents", "list"]).await;
    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_camera_status_derives_congestion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/camera/C1/status_full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "online",
            "vehiculos": 12,
            "detenidos": 2,
            "alerta_vehiculo": true
        })))
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();
    let config = write_config(&home, &server);

    let output = run(home.path(), &config, &["-o", "json", "cameras", "status", "C1"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    let board: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(board["cameras"][0]["congestion_level"], "high");
    assert_eq!(board["cameras"][0]["active_alert_type"], "vehicle");
    assert_eq!(board["summary"]["stopped_vehicles"], 2);
}
