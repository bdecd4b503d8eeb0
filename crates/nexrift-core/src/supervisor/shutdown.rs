//! Supervisor shutdown.
//!
//! Once shutdown begins no app can be started again. Every running app is
//! stopped concurrently with the usual grace-then-kill policy, then the exit
//! monitors are joined so no supervised process outlives the supervisor.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::error::NexriftError;
use crate::Supervisor;

/// Result of a completed shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Apps that were running and have been stopped.
    pub stopped: Vec<String>,
    /// Apps whose termination failed.
    pub failed: Vec<String>,
    /// Monitor tasks still running when the join timeout expired.
    pub abandoned_monitors: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.abandoned_monitors == 0
    }
}

/// Drives a supervisor through shutdown.
pub struct ShutdownCoordinator {
    supervisor: Supervisor,
    monitor_join_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            monitor_join_timeout: SupervisorConfig::MONITOR_JOIN_TIMEOUT,
        }
    }

    pub fn with_monitor_join_timeout(mut self, timeout: Duration) -> Self {
        self.monitor_join_timeout = timeout;
        self
    }

    /// Stop everything and join the exit monitors.
    pub async fn shutdown(&self) -> ShutdownReport {
        let state = &self.supervisor.state;
        if !state.begin_shutdown() {
            debug!("Shutdown already in progress");
        }

        // Configured ids cover starts that were in flight when shutdown began;
        // stop() waits on their operation lock.
        let mut targets: BTreeSet<String> =
            state.store.list().into_iter().map(|c| c.id).collect();
        targets.extend(state.registry.running_ids());

        let mut stops = JoinSet::new();
        for app_id in targets {
            let supervisor = self.supervisor.clone();
            stops.spawn(async move {
                let result = supervisor.stop(&app_id).await;
                (app_id, result)
            });
        }

        let mut report = ShutdownReport::default();
        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok((app_id, Ok(()))) => {
                    info!("Stopped {} during shutdown", app_id);
                    report.stopped.push(app_id);
                }
                Ok((_, Err(NexriftError::NotRunning { .. }))) => {}
                Ok((app_id, Err(e))) => {
                    error!("Failed to stop {} during shutdown: {}", app_id, e);
                    report.failed.push(app_id);
                }
                Err(e) => error!("Stop task panicked during shutdown: {}", e),
            }
        }
        report.stopped.sort();
        report.failed.sort();

        report.abandoned_monitors = self.join_monitors().await;
        if report.is_clean() {
            info!("Shutdown complete, stopped {} app(s)", report.stopped.len());
        } else {
            warn!("Shutdown finished with problems: {:?}", report);
        }
        report
    }

    async fn join_monitors(&self) -> usize {
        let handles = self.supervisor.state.monitors.drain();
        let mut monitors = JoinSet::new();
        for (app_id, handle) in handles {
            monitors.spawn(async move {
                if let Err(e) = handle.await {
                    warn!("Exit monitor for {} ended abnormally: {}", app_id, e);
                }
            });
        }

        let joined = tokio::time::timeout(self.monitor_join_timeout, async {
            while monitors.join_next().await.is_some() {}
        })
        .await;

        match joined {
            Ok(()) => 0,
            Err(_) => {
                let remaining = monitors.len();
                warn!(
                    "{} exit monitor(s) still running after {:?}",
                    remaining, self.monitor_join_timeout
                );
                monitors.abort_all();
                remaining
            }
        }
    }
}

impl Supervisor {
    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.state.is_shutting_down()
    }

    /// Run a full shutdown with default timeouts.
    pub async fn shutdown(&self) -> ShutdownReport {
        ShutdownCoordinator::new(self.clone()).shutdown().await
    }
}
