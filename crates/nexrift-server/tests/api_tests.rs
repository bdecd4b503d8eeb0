//! End-to-end tests for the nexrift-server HTTP API.
//!
//! Each test launches the server binary on an auto-assigned port against a
//! throwaway config file and talks to it over HTTP.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;

struct ServerHandle {
    child: tokio::process::Child,
    port: u16,
    stdout_drain: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    async fn stop(mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.start_kill();
    }
}

async fn check_health(port: u16) -> bool {
    let client = reqwest::Client::new();
    if let Ok(response) = client
        .get(format!("http://127.0.0.1:{}/api/health", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        if let Ok(json) = response.json::<Value>().await {
            return json.get("status").and_then(|v| v.as_str()) == Some("healthy");
        }
    }
    false
}

async fn wait_for_server(port: u16, timeout_secs: u64) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(timeout_secs) {
        if check_health(port).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

/// Launch the server binary and wait until `/api/health` answers.
async fn start_server(config_path: &Path) -> ServerHandle {
    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_nexrift-server"))
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .arg("--config")
        .arg(config_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn nexrift-server");

    let stdout = child.stdout.take().expect("failed to capture stdout");
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let mut port = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(250), lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Some(value) = line.strip_prefix("NEXRIFT_PORT=") {
                    port = Some(value.trim().parse::<u16>().expect("invalid port line"));
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(err)) => panic!("failed to read server stdout: {err}"),
            Err(_) => continue,
        }
    }

    let port = port.expect("NEXRIFT_PORT line not emitted");
    assert!(
        wait_for_server(port, 15).await,
        "server failed health check on port {port}"
    );

    let stdout_drain =
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    ServerHandle {
        child,
        port,
        stdout_drain: Some(stdout_drain),
    }
}

fn write_config(dir: &Path, apps: Value) -> PathBuf {
    let path = dir.join("apps_config.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&apps).unwrap()).unwrap();
    path
}

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
fn script_app(dir: &Path, id: &str, script: &Path) -> Value {
    json!({
        "id": id,
        "name": format!("{} app", id),
        "type": "batch",
        "path": script.to_string_lossy(),
        "port": 1,
        "description": "test app",
        "working_dir": dir.to_string_lossy(),
    })
}

#[cfg(unix)]
fn pid_alive(pid: u64) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_health_and_empty_config_created() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("nested").join("apps_config.json");
    let server = start_server(&config_path).await;

    let client = reqwest::Client::new();
    let health: Value = client
        .get(server.url("/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["timestamp"].as_str().is_some());

    let apps: Value = client
        .get(server.url("/api/apps"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(apps, json!([]));
    assert!(config_path.exists());

    server.stop().await;
}

#[tokio::test]
async fn test_server_status_reports_host_metrics() {
    let temp = TempDir::new().unwrap();
    let config_path = write_config(temp.path(), json!([]));
    let server = start_server(&config_path).await;

    let response = reqwest::Client::new()
        .get(server.url("/api/server/status"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let status: Value = response.json().await.unwrap();
    assert!(status["cpu_percent"].is_number());
    assert!(status["memory_total"].as_u64().unwrap_or(0) > 0);
    assert_eq!(status["running_apps"], 0);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_app_is_404() {
    let temp = TempDir::new().unwrap();
    let config_path = write_config(temp.path(), json!([]));
    let server = start_server(&config_path).await;
    let client = reqwest::Client::new();

    for (method, path) in [
        ("GET", "/api/apps/ghost"),
        ("POST", "/api/apps/ghost/start"),
        ("GET", "/api/apps/ghost/logs"),
        ("GET", "/api/apps/ghost/test"),
    ] {
        let request = match method {
            "GET" => client.get(server.url(path)),
            _ => client.post(server.url(path)),
        };
        let response = request.send().await.unwrap();
        assert_eq!(response.status().as_u16(), 404, "{} {}", method, path);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "config_not_found");
    }

    let response = client
        .post(server.url("/api/apps/ghost/stop"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    server.stop().await;
}

#[tokio::test]
async fn test_config_crud_persists() {
    let temp = TempDir::new().unwrap();
    let config_path = write_config(temp.path(), json!([]));
    let server = start_server(&config_path).await;
    let client = reqwest::Client::new();

    let app = json!({
        "id": "swarmui",
        "name": "SwarmUI",
        "type": "executable",
        "path": "/opt/swarmui/launch",
        "port": 7801,
    });
    let response = client
        .post(server.url("/api/apps"))
        .json(&app)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let duplicate = client
        .post(server.url("/api/apps"))
        .json(&app)
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status().as_u16(), 400);

    let response = client
        .put(server.url("/api/apps/swarmui"))
        .json(&json!({
            "name": "SwarmUI Nightly",
            "type": "executable",
            "path": "/opt/swarmui/launch",
            "port": 7802,
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["port"], 7802);

    let persisted: Value =
        serde_json::from_slice(&std::fs::read(&config_path).unwrap()).unwrap();
    assert_eq!(persisted[0]["name"], "SwarmUI Nightly");

    let preview: Value = client
        .get(server.url("/api/apps/swarmui/test"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(preview["app_id"], "swarmui");
    assert_eq!(preview["main_path_exists"], false);

    let response = client
        .delete(server.url("/api/apps/swarmui"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let persisted: Value =
        serde_json::from_slice(&std::fs::read(&config_path).unwrap()).unwrap();
    assert_eq!(persisted, json!([]));

    server.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_lifecycle_over_http() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "serve.sh", "echo ready\nexec sleep 60");
    let config_path = write_config(temp.path(), json!([script_app(temp.path(), "web", &script)]));
    let server = start_server(&config_path).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/api/apps/web/start"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let started: Value = response.json().await.unwrap();
    assert_eq!(started["success"], true);
    let pid = started["pid"].as_u64().expect("pid in start response");

    let again = client
        .post(server.url("/api/apps/web/start"))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 409);

    let status: Value = client
        .get(server.url("/api/apps/web"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "running");
    assert_eq!(status["pid"].as_u64(), Some(pid));

    let health: Value = client
        .get(server.url("/api/apps/web/status/detailed"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["process_running"], true);
    assert_eq!(health["port_accessible"], false);
    assert_eq!(health["health_check"], "unhealthy");

    let logs: Value = client
        .get(server.url("/api/apps/web/logs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(logs["is_running"], true);
    assert_eq!(logs["logs"][0]["type"], "info");

    let response = client
        .post(server.url("/api/apps/web/stop"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert!(!pid_alive(pid));

    let status: Value = client
        .get(server.url("/api/apps/web"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "stopped");

    let logs: Value = client
        .get(server.url("/api/apps/web/logs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(logs["is_running"], false);
    let stdout = logs["logs"]
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["type"] == "stdout")
        .expect("stdout entry");
    assert!(stdout["content"].as_str().unwrap().contains("ready"));

    let again = client
        .post(server.url("/api/apps/web/stop"))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 409);

    server.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_running_app_cannot_be_removed() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "serve.sh", "exec sleep 60");
    let config_path = write_config(temp.path(), json!([script_app(temp.path(), "web", &script)]));
    let server = start_server(&config_path).await;
    let client = reqwest::Client::new();

    client
        .post(server.url("/api/apps/web/start"))
        .send()
        .await
        .unwrap();
    let response = client
        .delete(server.url("/api/apps/web"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "already_running");

    client
        .post(server.url("/api/apps/web/stop"))
        .send()
        .await
        .unwrap();
    server.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigterm_stops_supervised_apps() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "serve.sh", "exec sleep 60");
    let config_path = write_config(
        temp.path(),
        json!([
            script_app(temp.path(), "one", &script),
            script_app(temp.path(), "two", &script),
        ]),
    );
    let mut server = start_server(&config_path).await;
    let client = reqwest::Client::new();

    let mut pids = Vec::new();
    for id in ["one", "two"] {
        let started: Value = client
            .post(server.url(&format!("/api/apps/{}/start", id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        pids.push(started["pid"].as_u64().unwrap());
    }
    assert!(pids.iter().all(|pid| pid_alive(*pid)));

    let server_pid = server.child.id().expect("server pid");
    let sent = std::process::Command::new("kill")
        .arg("-TERM")
        .arg(server_pid.to_string())
        .status()
        .unwrap();
    assert!(sent.success());

    let exit = tokio::time::timeout(Duration::from_secs(20), server.child.wait())
        .await
        .expect("server did not exit after SIGTERM")
        .unwrap();
    assert!(exit.success());
    assert!(pids.iter().all(|pid| !pid_alive(*pid)));
}
