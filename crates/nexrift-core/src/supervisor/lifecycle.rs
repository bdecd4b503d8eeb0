//! Start, stop and restart.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{NexriftError, Result, SpawnFailure};
use crate::models::{AppConfig, StartResponse};
use crate::process::{ExitMonitor, ExitOutcome, ExitReceiver, ProcessRecord, ProcessState};
use crate::Supervisor;

/// How a bounded wait for process exit ended.
enum ExitWait {
    /// The exit monitor published the outcome.
    Observed(Arc<ExitOutcome>),
    /// The process is gone but no outcome was published.
    Gone,
    TimedOut,
}

impl Supervisor {
    // ========================================
    // Lifecycle Methods
    // ========================================

    /// Start an app.
    ///
    /// Fails with `ConfigNotFound`, `AlreadyRunning`, `SpawnFailed` or
    /// `ShuttingDown`. Returns as soon as the process is spawned; its exit is
    /// observed in the background.
    pub async fn start(&self, app_id: &str) -> Result<StartResponse> {
        if self.state.is_shutting_down() {
            return Err(NexriftError::ShuttingDown);
        }
        let config = self.state.config(app_id)?;

        let lock = self.state.op_lock(app_id);
        let _guard = lock.lock().await;
        self.start_locked(&config).await
    }

    /// Stop an app and its whole process tree.
    ///
    /// Sends a polite termination request, waits the grace period, then kills
    /// the tree. Fails with `NotRunning`, or `TerminationFailed` if signalling
    /// itself fails. Never fails on timeout.
    pub async fn stop(&self, app_id: &str) -> Result<()> {
        if !self.state.store.contains(app_id) && !self.state.registry.is_running(app_id) {
            return Err(NexriftError::NotRunning {
                app_id: app_id.to_string(),
            });
        }
        let lock = self.state.op_lock(app_id);
        let _guard = lock.lock().await;
        self.stop_locked(app_id).await
    }

    /// Stop (if running), wait for ports to be released, then start.
    ///
    /// The per-app lock is held across the whole sequence.
    pub async fn restart(&self, app_id: &str) -> Result<StartResponse> {
        let config = self.state.config(app_id)?;

        let lock = self.state.op_lock(app_id);
        let _guard = lock.lock().await;

        match self.stop_locked(app_id).await {
            Ok(()) | Err(NexriftError::NotRunning { .. }) => {}
            Err(e) => return Err(e),
        }

        tokio::time::sleep(self.state.settings.restart_settle).await;
        self.start_locked(&config).await
    }

    async fn start_locked(&self, config: &AppConfig) -> Result<StartResponse> {
        let app_id = config.id.as_str();
        if self.state.is_shutting_down() {
            return Err(NexriftError::ShuttingDown);
        }
        if self.state.live_pid(app_id).is_some() {
            return Err(NexriftError::AlreadyRunning {
                app_id: app_id.to_string(),
            });
        }

        let resolved = self.state.commands.build(config)?;
        let command_line = resolved.display();

        if !resolved.working_dir.is_dir() {
            return Err(NexriftError::SpawnFailed {
                app_id: app_id.to_string(),
                reason: SpawnFailure::BadWorkingDirectory,
                message: "Working directory does not exist".to_string(),
                command: command_line,
                working_dir: resolved.working_dir,
                source: None,
            });
        }

        info!(
            "Starting {} ({}) in {}: {}",
            config.name,
            app_id,
            resolved.working_dir.display(),
            command_line
        );

        let child = resolved
            .to_command()
            .spawn()
            .map_err(|e| NexriftError::SpawnFailed {
                app_id: app_id.to_string(),
                reason: SpawnFailure::from_io(&e),
                message: e.to_string(),
                command: command_line.clone(),
                working_dir: resolved.working_dir.clone(),
                source: Some(e),
            })?;

        let Some(pid) = child.id() else {
            return Err(NexriftError::SpawnFailed {
                app_id: app_id.to_string(),
                reason: SpawnFailure::Other,
                message: "Process exited before its pid could be read".to_string(),
                command: command_line,
                working_dir: resolved.working_dir,
                source: None,
            });
        };

        let started_at = Utc::now();
        self.state.registry.insert_running(ProcessRecord::running(
            app_id,
            pid,
            started_at,
            command_line.clone(),
        ))?;

        let handle = ExitMonitor::new(app_id, pid).spawn(child, Arc::clone(&self.state.registry));
        self.state.monitors.insert(app_id, handle);

        info!("Started {} (PID: {})", config.name, pid);

        Ok(StartResponse {
            app_id: app_id.to_string(),
            pid,
            started_at,
            command: command_line,
        })
    }

    async fn stop_locked(&self, app_id: &str) -> Result<()> {
        let pid = self
            .state
            .registry
            .running_pid(app_id)
            .ok_or_else(|| NexriftError::NotRunning {
                app_id: app_id.to_string(),
            })?;
        let mut exit_rx = self.state.monitors.exit_receiver(app_id, pid);
        let settings = &self.state.settings;

        // Parent links vanish once the leader exits.
        let tree = self.snapshot_tree(pid).await;

        info!("Stopping {} (pid {}, {} descendants)", app_id, pid, tree.len());
        let grace_deadline = Instant::now() + settings.grace_period;
        self.terminate(app_id, pid, false).await?;

        let mut wait = self.wait_for_exit(exit_rx.as_mut(), pid, settings.grace_period).await;
        let leader_exited = !matches!(wait, ExitWait::TimedOut);
        let survivors = if leader_exited {
            self.wait_for_tree(&tree, grace_deadline).await
        } else {
            Vec::new()
        };

        if !leader_exited || !survivors.is_empty() {
            if leader_exited {
                warn!(
                    "{} exited but descendants {:?} outlived the {:?} grace period, killing them",
                    app_id, survivors, settings.grace_period
                );
            } else {
                warn!(
                    "{} (pid {}) still running after {:?}, killing process tree",
                    app_id, pid, settings.grace_period
                );
            }
            self.terminate(app_id, pid, true).await?;
            for child in self.living(&tree) {
                if let Err(e) = self.terminate(app_id, child, true).await {
                    warn!("{}", e);
                }
            }

            let kill_deadline = Instant::now() + settings.kill_wait;
            if !leader_exited {
                wait = self.wait_for_exit(exit_rx.as_mut(), pid, settings.kill_wait).await;
            }
            let leftover = self.wait_for_tree(&tree, kill_deadline).await;
            if !leftover.is_empty() {
                warn!(
                    "Descendants {:?} of {} survived SIGKILL for {:?}",
                    leftover, app_id, settings.kill_wait
                );
            }
        }

        let output = match wait {
            ExitWait::Observed(outcome) => Some(outcome.captured()),
            ExitWait::Gone => None,
            ExitWait::TimedOut => {
                warn!(
                    "Exit of {} (pid {}) not observed within {:?} of kill",
                    app_id, pid, settings.kill_wait
                );
                None
            }
        };

        if self
            .state
            .registry
            .finalize(app_id, pid, ProcessState::Stopped, output)
        {
            info!("Stopped {}", app_id);
        } else {
            debug!("{} exited on its own before stop completed", app_id);
        }
        Ok(())
    }

    async fn snapshot_tree(&self, pid: u32) -> Vec<u32> {
        let terminator = Arc::clone(&self.state.terminator);
        tokio::task::spawn_blocking(move || terminator.descendants(pid))
            .await
            .unwrap_or_default()
    }

    fn living(&self, pids: &[u32]) -> Vec<u32> {
        pids.iter()
            .copied()
            .filter(|&p| self.state.terminator.is_alive(p))
            .collect()
    }

    /// Poll until every pid in `tree` is gone or `deadline` passes.
    /// Returns the pids still alive.
    async fn wait_for_tree(&self, tree: &[u32], deadline: Instant) -> Vec<u32> {
        loop {
            let alive = self.living(tree);
            if alive.is_empty() || Instant::now() >= deadline {
                return alive;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal the tree off the async executor.
    async fn terminate(&self, app_id: &str, pid: u32, force: bool) -> Result<()> {
        let terminator = Arc::clone(&self.state.terminator);
        let result = tokio::task::spawn_blocking(move || {
            if force {
                terminator.force_kill(pid)
            } else {
                terminator.request_stop(pid)
            }
        })
        .await;

        let message = match result {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(join) => join.to_string(),
        };
        Err(NexriftError::TerminationFailed {
            app_id: app_id.to_string(),
            pid,
            message,
        })
    }

    async fn wait_for_exit(
        &self,
        exit_rx: Option<&mut ExitReceiver>,
        pid: u32,
        within: Duration,
    ) -> ExitWait {
        let terminator = &self.state.terminator;
        let wait = async {
            if let Some(rx) = exit_rx {
                let published = match rx.wait_for(Option::is_some).await {
                    Ok(value) => (*value).clone(),
                    Err(_) => None,
                };
                if let Some(outcome) = published {
                    return ExitWait::Observed(outcome);
                }
            }
            // Monitor gone without publishing; fall back to probing.
            while terminator.is_alive(pid) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            ExitWait::Gone
        };

        tokio::time::timeout(within, wait)
            .await
            .unwrap_or(ExitWait::TimedOut)
    }
}
