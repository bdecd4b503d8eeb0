//! GPU monitoring support.
//!
//! NVIDIA GPUs are queried through `nvidia-smi`. Hosts without it get a
//! no-op monitor and report no GPU at all.

use super::GpuMetrics;
use crate::error::Result;
use std::collections::HashMap;
use std::process::Command;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Trait for GPU monitoring implementations.
pub trait GpuMonitor: Send + Sync {
    /// Check if GPU monitoring is available.
    fn is_available(&self) -> bool;

    /// Overall GPU utilization, or `None` without a GPU.
    fn gpu_metrics(&self) -> Result<Option<GpuMetrics>>;

    /// GPU memory in bytes for each of `pids` that holds any.
    fn processes_gpu_memory(&self, pids: &[u32]) -> Result<HashMap<u32, u64>>;

    /// Drop cached samples.
    fn refresh(&self);
}

type Cached<T> = RwLock<Option<(T, Instant)>>;

/// NVIDIA GPU monitor using nvidia-smi.
pub struct NvidiaSmiMonitor {
    cache_ttl: Duration,
    gpu_cache: Cached<Option<GpuMetrics>>,
    process_cache: Cached<HashMap<u32, u64>>,
    available: bool,
}

impl NvidiaSmiMonitor {
    /// Create a new NVIDIA GPU monitor.
    ///
    /// # Arguments
    ///
    /// * `cache_ttl` - How long to cache nvidia-smi results
    pub fn new(cache_ttl: Duration) -> Self {
        let available = Command::new("nvidia-smi")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);

        if !available {
            debug!("nvidia-smi not available - GPU monitoring disabled");
        }

        Self {
            cache_ttl,
            gpu_cache: RwLock::new(None),
            process_cache: RwLock::new(None),
            available,
        }
    }

    fn query_gpu(&self) -> Option<GpuMetrics> {
        if !self.available {
            return None;
        }

        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=utilization.gpu,memory.used,memory.total,temperature.gpu,name",
                "--format=csv,noheader,nounits",
            ])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let line = stdout.lines().next().unwrap_or("");
                let parsed = parse_gpu_line(line);
                if parsed.is_none() {
                    debug!("Unexpected nvidia-smi output format: {}", line);
                }
                parsed
            }
            Ok(output) => {
                debug!(
                    "nvidia-smi returned non-zero: {}",
                    String::from_utf8_lossy(&output.stderr)
                );
                None
            }
            Err(e) => {
                debug!("Failed to run nvidia-smi: {}", e);
                None
            }
        }
    }

    fn query_process_memory(&self) -> HashMap<u32, u64> {
        if !self.available {
            return HashMap::new();
        }

        let output = Command::new("nvidia-smi")
            .args([
                "--query-compute-apps=pid,used_memory",
                "--format=csv,noheader,nounits",
            ])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                parse_process_lines(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                debug!(
                    "nvidia-smi process query returned non-zero: {}",
                    String::from_utf8_lossy(&output.stderr)
                );
                HashMap::new()
            }
            Err(e) => {
                debug!("Failed to run nvidia-smi for process query: {}", e);
                HashMap::new()
            }
        }
    }

    fn cached<T: Clone>(&self, cache: &Cached<T>, query: impl FnOnce() -> T) -> T {
        if let Ok(guard) = cache.read() {
            if let Some((value, timestamp)) = guard.as_ref() {
                if timestamp.elapsed() < self.cache_ttl {
                    return value.clone();
                }
            }
        }

        let value = query();
        if let Ok(mut guard) = cache.write() {
            *guard = Some((value.clone(), Instant::now()));
        }
        value
    }
}

impl Default for NvidiaSmiMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl GpuMonitor for NvidiaSmiMonitor {
    fn is_available(&self) -> bool {
        self.available
    }

    fn gpu_metrics(&self) -> Result<Option<GpuMetrics>> {
        Ok(self.cached(&self.gpu_cache, || self.query_gpu()))
    }

    fn processes_gpu_memory(&self, pids: &[u32]) -> Result<HashMap<u32, u64>> {
        let all = self.cached(&self.process_cache, || self.query_process_memory());
        Ok(pids
            .iter()
            .filter_map(|pid| all.get(pid).map(|mem| (*pid, *mem)))
            .collect())
    }

    fn refresh(&self) {
        if let Ok(mut cache) = self.gpu_cache.write() {
            *cache = None;
        }
        if let Ok(mut cache) = self.process_cache.write() {
            *cache = None;
        }
    }
}

/// Parse one `utilization,used MiB,total MiB,temp,name` line.
fn parse_gpu_line(line: &str) -> Option<GpuMetrics> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 4 {
        return None;
    }
    Some(GpuMetrics {
        utilization_percent: parts[0].parse().unwrap_or(0.0),
        memory_used: parts[1].parse::<u64>().unwrap_or(0) * 1024 * 1024,
        memory_total: parts[2].parse::<u64>().unwrap_or(0) * 1024 * 1024,
        temperature: parts[3].parse().ok(),
        name: parts.get(4).map(|s| s.to_string()),
    })
}

/// Parse `pid,used MiB` lines into bytes per pid.
fn parse_process_lines(stdout: &str) -> HashMap<u32, u64> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split(',').map(str::trim);
            let pid = parts.next()?.parse::<u32>().ok()?;
            let memory_mb = parts.next()?.parse::<u64>().ok()?;
            Some((pid, memory_mb * 1024 * 1024))
        })
        .fold(HashMap::new(), |mut acc, (pid, bytes)| {
            *acc.entry(pid).or_insert(0) += bytes;
            acc
        })
}

/// No-op GPU monitor for systems without GPU support.
pub struct NoOpGpuMonitor;

impl GpuMonitor for NoOpGpuMonitor {
    fn is_available(&self) -> bool {
        false
    }

    fn gpu_metrics(&self) -> Result<Option<GpuMetrics>> {
        Ok(None)
    }

    fn processes_gpu_memory(&self, _pids: &[u32]) -> Result<HashMap<u32, u64>> {
        Ok(HashMap::new())
    }

    fn refresh(&self) {}
}

/// Create the appropriate GPU monitor for the current system.
pub fn create_gpu_monitor() -> Box<dyn GpuMonitor> {
    let nvidia_monitor = NvidiaSmiMonitor::default();
    if nvidia_monitor.is_available() {
        Box::new(nvidia_monitor)
    } else {
        Box::new(NoOpGpuMonitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_monitor() {
        let monitor = NoOpGpuMonitor;
        assert!(!monitor.is_available());
        assert!(monitor.gpu_metrics().unwrap().is_none());
        assert!(monitor.processes_gpu_memory(&[1234]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_gpu_line() {
        let gpu = parse_gpu_line("37, 8123, 24576, 61, NVIDIA GeForce RTX 4090").unwrap();
        assert_eq!(gpu.utilization_percent, 37.0);
        assert_eq!(gpu.memory_used, 8123 * 1024 * 1024);
        assert_eq!(gpu.temperature, Some(61.0));
        assert_eq!(gpu.name.as_deref(), Some("NVIDIA GeForce RTX 4090"));

        assert!(parse_gpu_line("garbage").is_none());
    }

    #[test]
    fn test_parse_process_lines() {
        let map = parse_process_lines("4242, 1024\n4243, 512\n\nbad line\n4242, 1024\n");
        assert_eq!(map.get(&4242), Some(&(2048 * 1024 * 1024)));
        assert_eq!(map.get(&4243), Some(&(512 * 1024 * 1024)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_nvidia_monitor_creation() {
        // Passes whether or not nvidia-smi is installed.
        let monitor = NvidiaSmiMonitor::default();
        let _ = monitor.gpu_metrics();
        let _ = monitor.processes_gpu_memory(&[1234]);
    }
}
