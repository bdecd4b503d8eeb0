//! Status, health, logs and other read-only queries.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::NetworkConfig;
use crate::error::{NexriftError, Result};
use crate::models::{
    AppConfig, AppStatus, CommandPreview, HealthReport, LogEntry, LogStream, LogsResponse,
    RunState, ServerStatusResponse,
};
use crate::process::ProcessRecord;
use crate::system::ProcessMetrics;
use crate::Supervisor;

impl Supervisor {
    // ========================================
    // Status Methods
    // ========================================

    /// Live status of one app.
    ///
    /// Liveness comes from probing the OS for the recorded pid. Resource
    /// fields are best effort and left empty if sampling fails or is slow.
    pub async fn status(&self, app_id: &str) -> Result<AppStatus> {
        let config = self.state.config(app_id)?;
        Ok(self.build_status(&config).await)
    }

    /// Status of every configured app, in configuration order.
    pub async fn list(&self) -> Vec<AppStatus> {
        let configs = self.state.store.list();
        join_all(configs.iter().map(|config| self.build_status(config))).await
    }

    /// Process liveness plus a TCP probe of the app's port.
    pub async fn health(&self, app_id: &str) -> Result<HealthReport> {
        let config = self.state.config(app_id)?;
        let status = self.build_status(&config).await;

        let process_running = status.is_running();
        let port_accessible = process_running && self.probe_port(config.port).await;
        let healthy = process_running && port_accessible;

        Ok(HealthReport {
            return_code: status.last_exit_code,
            status,
            process_running,
            port_accessible,
            health_check: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        })
    }

    /// Resolve the launch command without spawning.
    pub fn preview(&self, app_id: &str) -> Result<CommandPreview> {
        let config = self.state.config(app_id)?;
        Ok(self.state.commands.preview(&config))
    }

    /// Output captured from the most recent finished run.
    pub fn logs(&self, app_id: &str) -> Result<LogsResponse> {
        let config = self.state.config(app_id)?;
        let record = self.state.registry.get(app_id);

        let mut logs = Vec::new();
        let (is_running, pid, exit_code) = match &record {
            Some(record) if record.is_running() => {
                logs.push(LogEntry {
                    stream: LogStream::Info,
                    content: "Process is running, logs available after termination".to_string(),
                });
                (true, Some(record.pid), None)
            }
            Some(record) => {
                if let Some(output) = &record.output {
                    if !output.stdout.is_empty() {
                        logs.push(LogEntry {
                            stream: LogStream::Stdout,
                            content: output.stdout.clone(),
                        });
                    }
                    if !output.stderr.is_empty() {
                        logs.push(LogEntry {
                            stream: LogStream::Stderr,
                            content: output.stderr.clone(),
                        });
                    }
                }
                (false, Some(record.pid), record.exit_code())
            }
            None => (false, None, None),
        };

        Ok(LogsResponse {
            app_id: config.id,
            name: config.name,
            is_running,
            pid,
            exit_code,
            logs,
        })
    }

    pub fn running_count(&self) -> usize {
        self.state.registry.running_count()
    }

    /// Ids of apps currently running, sorted.
    pub fn running_app_ids(&self) -> Vec<String> {
        self.state.registry.running_ids()
    }

    pub fn is_running(&self, app_id: &str) -> bool {
        self.state.live_pid(app_id).is_some()
    }

    /// Host resource usage plus the number of running apps.
    pub async fn server_status(&self) -> Result<ServerStatusResponse> {
        let metrics = self
            .state
            .metrics
            .clone()
            .ok_or_else(|| NexriftError::MetricsUnavailable {
                message: "no metrics provider configured".to_string(),
            })?;

        let host = tokio::task::spawn_blocking(move || metrics.host_metrics())
            .await
            .map_err(|e| NexriftError::MetricsUnavailable {
                message: e.to_string(),
            })??;

        Ok(ServerStatusResponse {
            host,
            running_apps: self.running_count(),
        })
    }

    async fn build_status(&self, config: &AppConfig) -> AppStatus {
        let record = self.state.registry.get(&config.id);
        let live = record
            .as_ref()
            .filter(|r| r.is_running() && self.state.terminator.is_alive(r.pid));

        let mut status = AppStatus {
            id: config.id.clone(),
            name: config.name.clone(),
            status: RunState::Stopped,
            kind: config.launch_kind(),
            environment: config.environment.clone(),
            path: config.path.clone(),
            port: config.port,
            description: config.description.clone(),
            output_folder: config.output_folder.clone(),
            pid: None,
            started_at: None,
            uptime: None,
            cpu_percent: None,
            memory_mb: None,
            gpu_memory_mb: None,
            last_exit_code: record.as_ref().and_then(ProcessRecord::exit_code),
        };

        if let Some(record) = live {
            status.status = RunState::Running;
            status.pid = Some(record.pid);
            status.started_at = Some(record.started_at);
            status.uptime = Some(
                (Utc::now() - record.started_at)
                    .num_seconds()
                    .max(0) as u64,
            );

            if let Some(metrics) = self.sample_process(record.pid).await {
                status.cpu_percent = Some(metrics.cpu_percent);
                status.memory_mb = Some(metrics.memory_mb);
                status.gpu_memory_mb = metrics.gpu_memory_mb;
            }
        }

        status
    }

    /// Bounded, failure-tolerant per-process sample.
    async fn sample_process(&self, pid: u32) -> Option<ProcessMetrics> {
        let metrics = Arc::clone(self.state.metrics.as_ref()?);
        let sample = tokio::task::spawn_blocking(move || metrics.process_metrics(pid));

        match tokio::time::timeout(self.state.settings.metrics_timeout, sample).await {
            Ok(Ok(Ok(metrics))) => metrics,
            Ok(Ok(Err(e))) => {
                debug!("Metrics for pid {} unavailable: {}", pid, e);
                None
            }
            Ok(Err(e)) => {
                warn!("Metrics task for pid {} failed: {}", pid, e);
                None
            }
            Err(_) => {
                debug!(
                    "Metrics for pid {} timed out after {:?}",
                    pid, self.state.settings.metrics_timeout
                );
                None
            }
        }
    }

    async fn probe_port(&self, port: u16) -> bool {
        let target = (NetworkConfig::PORT_CHECK_HOST, port);
        match tokio::time::timeout(
            self.state.settings.port_check_timeout,
            TcpStream::connect(target),
        )
        .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Port {} not accepting connections: {}", port, e);
                false
            }
            Err(_) => false,
        }
    }
}
