//! Integration tests for the Supervisor public interface.
//!
//! These tests drive a supervisor backed by a real `JsonConfigStore` and
//! check that config changes survive reopening the store.

use nexrift_core::store::backup_path;
use nexrift_core::{
    AppConfig, ConfigStore, JsonConfigStore, LaunchKind, NexriftError, RunState, Supervisor,
    SupervisorSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        grace_period: Duration::from_secs(2),
        kill_wait: Duration::from_secs(2),
        restart_settle: Duration::from_millis(50),
        ..SupervisorSettings::default()
    }
}

fn open_supervisor(temp_dir: &TempDir) -> Supervisor {
    let store = JsonConfigStore::open_or_create(temp_dir.path().join("apps_config.json")).unwrap();
    Supervisor::builder(Arc::new(store))
        .with_settings(fast_settings())
        .build()
}

fn comfy_config() -> AppConfig {
    AppConfig::new(
        "comfyui",
        "ComfyUI",
        LaunchKind::NamedEnvironment,
        "/opt/ComfyUI/main.py",
        8188,
    )
    .with_environment("comfyui")
    .with_args(["--listen"])
}

#[tokio::test]
async fn test_added_apps_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let supervisor = open_supervisor(&temp_dir);
    supervisor.add_app(comfy_config()).await.unwrap();
    drop(supervisor);

    let reopened = open_supervisor(&temp_dir);
    let apps = reopened.list_apps();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0], comfy_config());

    let status = reopened.status("comfyui").await.unwrap();
    assert_eq!(status.status, RunState::Stopped);
    assert!(status.pid.is_none());
}

#[tokio::test]
async fn test_torn_save_keeps_previous_set() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("apps_config.json");

    let supervisor = open_supervisor(&temp_dir);
    supervisor.add_app(comfy_config()).await.unwrap();
    let mut second = comfy_config();
    second.id = "forge".into();
    second.port = 7860;
    supervisor.add_app(second).await.unwrap();
    drop(supervisor);
    assert!(backup_path(&path).exists());

    // A crash mid-write leaves a truncated primary behind
    std::fs::write(&path, b"[{\"id\": \"comf").unwrap();

    let store = JsonConfigStore::open(&path).unwrap();
    assert!(store.get("comfyui").is_some());
}

#[tokio::test]
async fn test_unknown_app_operations() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = open_supervisor(&temp_dir);

    assert!(matches!(
        supervisor.start("ghost").await,
        Err(NexriftError::ConfigNotFound { .. })
    ));
    assert!(matches!(
        supervisor.stop("ghost").await,
        Err(NexriftError::NotRunning { .. })
    ));
    assert!(matches!(
        supervisor.logs("ghost"),
        Err(NexriftError::ConfigNotFound { .. })
    ));
    assert!(supervisor.list().await.is_empty());
}

#[tokio::test]
async fn test_preview_resolves_named_environment() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = open_supervisor(&temp_dir);
    supervisor.add_app(comfy_config()).await.unwrap();

    let preview = supervisor.preview("comfyui").unwrap();
    assert_eq!(preview.kind, LaunchKind::NamedEnvironment);
    assert!(!preview.main_path_exists);
    assert!(preview.error.is_none());

    // Interpreter launches ignore configured args
    let command = preview.command.unwrap();
    assert_eq!(&command[1..4], ["run", "-n", "comfyui"]);
    assert_eq!(command.last().map(String::as_str), Some("/opt/ComfyUI/main.py"));
    assert!(!command.iter().any(|arg| arg == "--listen"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_shutdown_stops_running_apps() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let script = temp_dir.path().join("serve.sh");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 60\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let supervisor = open_supervisor(&temp_dir);
    let config = AppConfig::new(
        "sleeper",
        "Sleeper",
        LaunchKind::ShellScript,
        script.to_string_lossy(),
        1,
    )
    .with_working_dir(temp_dir.path());
    supervisor.add_app(config).await.unwrap();

    supervisor.start("sleeper").await.unwrap();
    assert_eq!(supervisor.running_app_ids(), vec!["sleeper".to_string()]);

    let report = supervisor.shutdown().await;
    assert!(report.is_clean());
    assert_eq!(report.stopped, vec!["sleeper".to_string()]);
    assert_eq!(supervisor.running_count(), 0);
    assert!(matches!(
        supervisor.start("sleeper").await,
        Err(NexriftError::ShuttingDown)
    ));
}
