//! Process building blocks used by the supervisor.
//!
//! - `command` - resolving app configs into launch commands
//! - `registry` - the table of live and finished runs
//! - `monitor` - per-process exit watching and output capture

mod command;
mod monitor;
mod registry;

pub use command::{normalize, resolve_path, CommandBuilder, ResolvedCommand};
pub use monitor::{ExitMonitor, ExitOutcome, ExitReceiver, MonitorHandle, MonitorSet};
pub use registry::{CapturedOutput, ProcessRecord, ProcessRegistry, ProcessState};
