//! Response types returned by supervisor operations and served by the API.

use super::LaunchKind;
use crate::system::HostMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Coarse run state reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
}

/// Result of a successful start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub app_id: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    /// Resolved command line, space-joined.
    pub command: String,
}

/// Live status of one configured app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStatus {
    pub id: String,
    pub name: String,
    pub status: RunState,
    #[serde(rename = "type")]
    pub kind: LaunchKind,
    pub environment: Option<String>,
    pub path: String,
    pub port: u16,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
}

impl AppStatus {
    pub fn is_running(&self) -> bool {
        self.status == RunState::Running
    }
}

/// Detailed health: process alive and port accepting connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(flatten)]
    pub status: AppStatus,
    pub process_running: bool,
    pub port_accessible: bool,
    /// `"healthy"` or `"unhealthy"`.
    pub health_check: String,
    pub return_code: Option<i32>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.process_running && self.port_accessible
    }
}

/// Dry-run resolution of the command an app would run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPreview {
    pub app_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LaunchKind,
    /// Full argv, when resolution succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Resolution failure, when it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub working_dir: PathBuf,
    pub working_dir_exists: bool,
    pub main_path_exists: bool,
}

/// Stream a captured log chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub stream: LogStream,
    pub content: String,
}

/// Output captured from the most recent finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub app_id: String,
    pub name: String,
    pub is_running: bool,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub logs: Vec<LogEntry>,
}

/// Host metrics plus supervisor counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatusResponse {
    #[serde(flatten)]
    pub host: HostMetrics,
    pub running_apps: usize,
}
