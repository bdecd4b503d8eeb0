//! Shared supervisor state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::SupervisorSettings;
use crate::error::{NexriftError, Result};
use crate::models::AppConfig;
use crate::platform::TreeTerminator;
use crate::process::{CommandBuilder, MonitorSet, ProcessRegistry, ProcessState};
use crate::store::ConfigStore;
use crate::system::MetricsProvider;

/// Everything a `Supervisor` handle points at.
pub(crate) struct SupervisorState {
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) registry: Arc<ProcessRegistry>,
    pub(crate) monitors: MonitorSet,
    pub(crate) metrics: Option<Arc<dyn MetricsProvider>>,
    pub(crate) terminator: Arc<dyn TreeTerminator>,
    pub(crate) commands: CommandBuilder,
    pub(crate) settings: SupervisorSettings,
    /// Serializes start/stop/restart per app id.
    op_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    shutting_down: AtomicBool,
}

impl SupervisorState {
    pub(crate) fn new(
        store: Arc<dyn ConfigStore>,
        metrics: Option<Arc<dyn MetricsProvider>>,
        terminator: Arc<dyn TreeTerminator>,
        commands: CommandBuilder,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            store,
            registry: Arc::new(ProcessRegistry::new()),
            monitors: MonitorSet::new(),
            metrics,
            terminator,
            commands,
            settings,
            op_locks: Mutex::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Operation lock for `app_id`, created on first use.
    pub(crate) fn op_lock(&self, app_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.op_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(app_id.to_string()).or_default())
    }

    /// Pid of the app's live process.
    ///
    /// A running record whose process is already gone is finalized as exited
    /// here; the exit monitor attaches its output once the pipes drain.
    pub(crate) fn live_pid(&self, app_id: &str) -> Option<u32> {
        let pid = self.registry.running_pid(app_id)?;
        if self.terminator.is_alive(pid) {
            return Some(pid);
        }
        if self
            .registry
            .finalize(app_id, pid, ProcessState::Exited(None), None)
        {
            debug!("{} (pid {}) is gone, output still draining", app_id, pid);
        }
        None
    }

    /// Forget the lock for `app_id` unless an operation holds or awaits it.
    pub(crate) fn release_op_lock(&self, app_id: &str) {
        let mut locks = self.op_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(app_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(app_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn op_lock_count(&self) -> usize {
        self.op_locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub(crate) fn config(&self, app_id: &str) -> Result<AppConfig> {
        self.store
            .get(app_id)
            .ok_or_else(|| NexriftError::ConfigNotFound {
                app_id: app_id.to_string(),
            })
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Returns `false` if shutdown had already begun.
    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }
}
