//! Live process table.
//!
//! One record per app id. A record is `Running` from a successful spawn until
//! it is finalized, exactly once, by whichever of `stop()` or the exit monitor
//! observes the termination first. Finalized records stay behind as tombstones
//! holding the exit code and captured output until the next start.

use crate::error::{NexriftError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Terminated through `stop()`.
    Stopped,
    /// Exited on its own. Signal deaths carry the negated signal number.
    Exited(Option<i32>),
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

/// Output and exit code collected once a process is gone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub app_id: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    /// Resolved command line.
    pub command: String,
    pub state: ProcessState,
    /// Present only after exit.
    pub output: Option<CapturedOutput>,
}

impl ProcessRecord {
    pub fn running(
        app_id: impl Into<String>,
        pid: u32,
        started_at: DateTime<Utc>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            pid,
            started_at,
            command: command.into(),
            state: ProcessState::Running,
            output: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Exit code of a finished run, if known.
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            ProcessState::Running => None,
            ProcessState::Exited(code) => {
                code.or_else(|| self.output.as_ref().and_then(|o| o.exit_code))
            }
            ProcessState::Stopped => self.output.as_ref().and_then(|o| o.exit_code),
        }
    }
}

/// Mutex-guarded table of process records.
///
/// The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    records: Mutex<HashMap<String, ProcessRecord>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, ProcessRecord>> {
        // Every mutation is a single assignment; poisoning is ignored.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a freshly spawned process, replacing any tombstone.
    pub fn insert_running(&self, record: ProcessRecord) -> Result<()> {
        let mut records = self.records();
        if records.get(&record.app_id).is_some_and(ProcessRecord::is_running) {
            return Err(NexriftError::AlreadyRunning {
                app_id: record.app_id,
            });
        }
        debug!("Registered {} with pid {}", record.app_id, record.pid);
        records.insert(record.app_id.clone(), record);
        Ok(())
    }

    pub fn get(&self, app_id: &str) -> Option<ProcessRecord> {
        self.records().get(app_id).cloned()
    }

    /// PID of the running record for `app_id`.
    pub fn running_pid(&self, app_id: &str) -> Option<u32> {
        self.records()
            .get(app_id)
            .filter(|r| r.is_running())
            .map(|r| r.pid)
    }

    pub fn is_running(&self, app_id: &str) -> bool {
        self.running_pid(app_id).is_some()
    }

    /// Move the running record for (`app_id`, `pid`) into a terminal state.
    ///
    /// Returns `true` only for the call that commits the transition. A later
    /// call for the same pid just attaches `output` if the tombstone has none.
    pub fn finalize(
        &self,
        app_id: &str,
        pid: u32,
        state: ProcessState,
        output: Option<CapturedOutput>,
    ) -> bool {
        debug_assert!(!state.is_running());
        let mut records = self.records();
        let Some(record) = records.get_mut(app_id).filter(|r| r.pid == pid) else {
            return false;
        };

        if record.is_running() {
            record.state = state;
            record.output = output;
            debug!("Finalized {} (pid {}) as {:?}", app_id, pid, state);
            true
        } else {
            if record.output.is_none() {
                record.output = output;
            }
            false
        }
    }

    /// Drop a tombstone. Running records are kept.
    pub fn remove_finished(&self, app_id: &str) -> bool {
        let mut records = self.records();
        if records.get(app_id).is_some_and(|r| !r.is_running()) {
            records.remove(app_id);
            true
        } else {
            false
        }
    }

    /// Ids of running apps, sorted.
    pub fn running_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .records()
            .values()
            .filter(|r| r.is_running())
            .map(|r| r.app_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn running_count(&self) -> usize {
        self.records().values().filter(|r| r.is_running()).count()
    }
}
