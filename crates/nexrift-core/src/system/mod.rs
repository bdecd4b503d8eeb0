//! Host and process resource sampling.
//!
//! The supervisor depends only on [`MetricsProvider`]; [`ResourceTracker`] is
//! the `sysinfo` + `nvidia-smi` implementation used by the server.

mod gpu;
mod resources;

pub use gpu::{create_gpu_monitor, GpuMonitor, NoOpGpuMonitor, NvidiaSmiMonitor};
pub use resources::ResourceTracker;

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Host-wide utilization. Byte counts are raw bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostMetrics {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_total: u64,
    pub memory_used: u64,
    pub disk_percent: f32,
    pub disk_total: u64,
    pub disk_used: u64,
    pub gpu: Option<GpuMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuMetrics {
    pub utilization_percent: f32,
    pub memory_used: u64,
    pub memory_total: u64,
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Usage of one app's process tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
    /// `None` when no GPU monitor is available.
    pub gpu_memory_mb: Option<f64>,
}

/// Source of resource samples.
///
/// Calls may block; async callers run them on the blocking pool.
pub trait MetricsProvider: Send + Sync {
    fn host_metrics(&self) -> Result<HostMetrics>;

    /// `Ok(None)` when `pid` is not visible to the provider.
    fn process_metrics(&self, pid: u32) -> Result<Option<ProcessMetrics>>;
}
