//! Exit monitoring for supervised processes.
//!
//! Each spawned child is handed to an [`ExitMonitor`] task that owns the
//! `Child`, drains its pipes, waits for exit, publishes the outcome on a watch
//! channel and finalizes the registry record.

use super::registry::{CapturedOutput, ProcessRegistry, ProcessState};
use std::collections::HashMap;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExitOutcome {
    pub fn captured(&self) -> CapturedOutput {
        CapturedOutput {
            exit_code: self.code,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }
}

/// Receives `Some(outcome)` once the monitored process has exited.
pub type ExitReceiver = watch::Receiver<Option<Arc<ExitOutcome>>>;

/// Settings for one monitor task.
#[derive(Debug, Clone)]
pub struct ExitMonitor {
    app_id: String,
    pid: u32,
    drain_timeout: Duration,
    capture_limit: usize,
}

/// Handle to a running monitor task.
pub struct MonitorHandle {
    pub pid: u32,
    pub exit_rx: ExitReceiver,
    pub task: JoinHandle<()>,
}

impl ExitMonitor {
    pub fn new(app_id: impl Into<String>, pid: u32) -> Self {
        Self {
            app_id: app_id.into(),
            pid,
            drain_timeout: crate::config::SupervisorConfig::OUTPUT_DRAIN_TIMEOUT,
            capture_limit: crate::config::SupervisorConfig::OUTPUT_CAPTURE_LIMIT,
        }
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    /// Start watching `child`. Must be called from within a tokio runtime.
    pub fn spawn(self, mut child: Child, registry: Arc<ProcessRegistry>) -> MonitorHandle {
        let (tx, exit_rx) = watch::channel(None);
        let pid = self.pid;

        let stdout = TailBuffer::shared(self.capture_limit);
        let stderr = TailBuffer::shared(self.capture_limit);
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(tokio::spawn(drain_into(pipe, Arc::clone(&stdout))));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(tokio::spawn(drain_into(pipe, Arc::clone(&stderr))));
        }

        let task = tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => exit_code(&status),
                Err(e) => {
                    error!("Failed to wait on {} (pid {}): {}", self.app_id, pid, e);
                    None
                }
            };

            // Grandchildren holding the pipes open must not block the monitor.
            let drained = tokio::time::timeout(self.drain_timeout, async {
                for reader in readers.iter_mut() {
                    let _ = reader.await;
                }
            })
            .await;
            if drained.is_err() {
                debug!("Output of {} still open after exit; truncating", self.app_id);
                for reader in &readers {
                    reader.abort();
                }
            }

            let outcome = Arc::new(ExitOutcome {
                code,
                stdout: TailBuffer::take_string(&stdout),
                stderr: TailBuffer::take_string(&stderr),
            });
            let _ = tx.send(Some(Arc::clone(&outcome)));

            let committed = registry.finalize(
                &self.app_id,
                pid,
                ProcessState::Exited(code),
                Some(outcome.captured()),
            );
            self.log_exit(&outcome, committed);
        });

        MonitorHandle { pid, exit_rx, task }
    }

    fn log_exit(&self, outcome: &ExitOutcome, committed: bool) {
        if !outcome.stdout.is_empty() {
            info!("{} stdout: {}", self.app_id, outcome.stdout.trim_end());
        }
        if !outcome.stderr.is_empty() {
            warn!("{} stderr: {}", self.app_id, outcome.stderr.trim_end());
        }
        if committed {
            info!(
                "{} (pid {}) exited with code {:?}",
                self.app_id, self.pid, outcome.code
            );
        } else {
            debug!(
                "{} (pid {}) exit observed after stop, code {:?}",
                self.app_id, self.pid, outcome.code
            );
        }
    }
}

#[cfg(unix)]
fn exit_code(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|s| -s))
}

#[cfg(not(unix))]
fn exit_code(status: &ExitStatus) -> Option<i32> {
    status.code()
}

/// Keeps the last `limit` bytes written to it.
#[derive(Debug)]
struct TailBuffer {
    bytes: Vec<u8>,
    limit: usize,
}

impl TailBuffer {
    fn shared(limit: usize) -> Arc<Mutex<TailBuffer>> {
        Arc::new(Mutex::new(TailBuffer {
            bytes: Vec::new(),
            limit,
        }))
    }

    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
        if self.bytes.len() > self.limit {
            let excess = self.bytes.len() - self.limit;
            self.bytes.drain(..excess);
        }
    }

    fn take_string(buffer: &Mutex<TailBuffer>) -> String {
        let bytes = std::mem::take(&mut lock(buffer).bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn lock(buffer: &Mutex<TailBuffer>) -> MutexGuard<'_, TailBuffer> {
    buffer.lock().unwrap_or_else(|e| e.into_inner())
}

async fn drain_into<R: AsyncRead + Unpin>(mut pipe: R, buffer: Arc<Mutex<TailBuffer>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => lock(&buffer).push(&chunk[..n]),
            Err(e) => {
                debug!("Output pipe read failed: {}", e);
                break;
            }
        }
    }
}

/// Monitor handles keyed by app id.
#[derive(Default)]
pub struct MonitorSet {
    handles: Mutex<HashMap<String, MonitorHandle>>,
}

impl MonitorSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, MonitorHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track the monitor for the latest run of `app_id`.
    pub fn insert(&self, app_id: impl Into<String>, handle: MonitorHandle) {
        // A previous run's monitor may still be draining; dropping detaches it.
        self.handles().insert(app_id.into(), handle);
    }

    /// Exit receiver for the monitor of (`app_id`, `pid`).
    pub fn exit_receiver(&self, app_id: &str, pid: u32) -> Option<ExitReceiver> {
        self.handles()
            .get(app_id)
            .filter(|h| h.pid == pid)
            .map(|h| h.exit_rx.clone())
    }

    /// Take every tracked task for joining.
    pub fn drain(&self) -> Vec<(String, JoinHandle<()>)> {
        self.handles()
            .drain()
            .map(|(app_id, handle)| (app_id, handle.task))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
