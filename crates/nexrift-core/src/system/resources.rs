//! System and process resource tracking.
//!
//! Provides resource monitoring for:
//! - Host-wide CPU, RAM, disk and GPU usage
//! - Per-app CPU, RAM and GPU memory, aggregated over the app's process tree

use super::gpu::{create_gpu_monitor, GpuMonitor};
use super::{HostMetrics, MetricsProvider, ProcessMetrics};
use crate::error::{NexriftError, Result};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};
use sysinfo::{Disks, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

struct CachedProcessMetrics {
    metrics: Option<ProcessMetrics>,
    timestamp: Instant,
}

/// Resource tracker backed by `sysinfo`.
pub struct ResourceTracker {
    /// How long a sample stays fresh.
    cache_ttl: Duration,
    system: RwLock<System>,
    gpu_monitor: Box<dyn GpuMonitor>,
    process_cache: RwLock<HashMap<u32, CachedProcessMetrics>>,
    last_system_refresh: RwLock<Option<Instant>>,
}

impl ResourceTracker {
    /// Create a new resource tracker.
    ///
    /// # Arguments
    ///
    /// * `cache_ttl` - How long to cache resource measurements
    pub fn new(cache_ttl: Duration) -> Self {
        Self::with_gpu_monitor(cache_ttl, create_gpu_monitor())
    }

    pub fn with_gpu_monitor(cache_ttl: Duration, gpu_monitor: Box<dyn GpuMonitor>) -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();

        Self {
            cache_ttl,
            system: RwLock::new(system),
            gpu_monitor,
            process_cache: RwLock::new(HashMap::new()),
            last_system_refresh: RwLock::new(None),
        }
    }

    /// Recursively collect all descendant PIDs of a process.
    fn collect_all_descendants(system: &System, parent_pid: Pid, pids: &mut Vec<u32>) {
        for (child_pid, child_process) in system.processes() {
            if child_process.parent() == Some(parent_pid) {
                let child_pid_u32 = child_pid.as_u32();
                if !pids.contains(&child_pid_u32) {
                    pids.push(child_pid_u32);
                    Self::collect_all_descendants(system, *child_pid, pids);
                }
            }
        }
    }

    fn compute_process_metrics(&self, pid: u32) -> Result<Option<ProcessMetrics>> {
        self.maybe_refresh_system()?;
        let system = self.read_system()?;
        let sysinfo_pid = Pid::from_u32(pid);

        if system.process(sysinfo_pid).is_none() {
            return Ok(None);
        }

        let mut pids = vec![pid];
        Self::collect_all_descendants(&system, sysinfo_pid, &mut pids);

        let (cpu, memory_bytes) = pids
            .iter()
            .filter_map(|p| system.process(Pid::from_u32(*p)))
            .fold((0.0f32, 0u64), |(cpu, mem), process| {
                (cpu + process.cpu_usage(), mem + process.memory())
            });
        drop(system);

        let gpu_memory_mb = if self.gpu_monitor.is_available() {
            let gpu: u64 = self.gpu_monitor.processes_gpu_memory(&pids)?.values().sum();
            Some(round2(gpu as f64 / BYTES_PER_MB))
        } else {
            None
        };

        Ok(Some(ProcessMetrics {
            cpu_percent: (cpu * 10.0).round() / 10.0,
            memory_mb: round2(memory_bytes as f64 / BYTES_PER_MB),
            gpu_memory_mb,
        }))
    }

    /// Clear the process resource cache.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.process_cache.write() {
            cache.clear();
        }
        self.gpu_monitor.refresh();
    }

    fn read_system(&self) -> Result<RwLockReadGuard<'_, System>> {
        self.system.read().map_err(|_| NexriftError::MetricsUnavailable {
            message: "system info lock poisoned".into(),
        })
    }

    /// Refresh system info if the cached sample has expired.
    fn maybe_refresh_system(&self) -> Result<()> {
        let should_refresh = self
            .last_system_refresh
            .read()
            .map(|last| last.map(|t| t.elapsed() >= self.cache_ttl).unwrap_or(true))
            .unwrap_or(true);

        if should_refresh {
            let mut system = self.system.write().map_err(|_| {
                NexriftError::MetricsUnavailable {
                    message: "system info lock poisoned".into(),
                }
            })?;
            system.refresh_cpu_all();
            system.refresh_memory();
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::new().with_cpu().with_memory(),
            );

            if let Ok(mut last) = self.last_system_refresh.write() {
                *last = Some(Instant::now());
            }
        }
        Ok(())
    }
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl MetricsProvider for ResourceTracker {
    fn host_metrics(&self) -> Result<HostMetrics> {
        self.maybe_refresh_system()?;

        let (cpu_percent, memory_total, memory_used) = {
            let system = self.read_system()?;
            (
                system.global_cpu_usage(),
                system.total_memory(),
                system.used_memory(),
            )
        };

        // First disk approximates the install volume.
        let disks = Disks::new_with_refreshed_list();
        let (disk_total, disk_free) = disks
            .list()
            .first()
            .map(|d| (d.total_space(), d.available_space()))
            .unwrap_or((0, 0));
        let disk_used = disk_total.saturating_sub(disk_free);

        Ok(HostMetrics {
            cpu_percent: (cpu_percent * 10.0).round() / 10.0,
            memory_percent: percent(memory_used, memory_total),
            memory_total,
            memory_used,
            disk_percent: percent(disk_used, disk_total),
            disk_total,
            disk_used,
            gpu: self.gpu_monitor.gpu_metrics()?,
        })
    }

    fn process_metrics(&self, pid: u32) -> Result<Option<ProcessMetrics>> {
        if let Ok(cache) = self.process_cache.read() {
            if let Some(cached) = cache.get(&pid) {
                if cached.timestamp.elapsed() < self.cache_ttl {
                    return Ok(cached.metrics.clone());
                }
            }
        }

        let metrics = self.compute_process_metrics(pid)?;

        if let Ok(mut cache) = self.process_cache.write() {
            // Pids of exited apps are never looked up again.
            cache.retain(|_, cached| cached.timestamp.elapsed() < self.cache_ttl);
            cache.insert(
                pid,
                CachedProcessMetrics {
                    metrics: metrics.clone(),
                    timestamp: Instant::now(),
                },
            );
        }

        Ok(metrics)
    }
}

fn percent(used: u64, total: u64) -> f32 {
    if total == 0 {
        0.0
    } else {
        ((used as f64 / total as f64) * 1000.0).round() as f32 / 10.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::super::gpu::NoOpGpuMonitor;
    use super::*;

    fn tracker() -> ResourceTracker {
        ResourceTracker::with_gpu_monitor(Duration::from_secs(2), Box::new(NoOpGpuMonitor))
    }

    #[test]
    fn test_host_metrics() {
        let metrics = tracker().host_metrics().unwrap();
        assert!(metrics.cpu_percent >= 0.0);
        assert!(metrics.memory_total > 0);
        assert!(metrics.memory_used <= metrics.memory_total);
        assert!(metrics.gpu.is_none());
    }

    #[test]
    fn test_process_metrics_self() {
        let metrics = tracker()
            .process_metrics(std::process::id())
            .unwrap()
            .expect("own process should be visible");
        assert!(metrics.memory_mb > 0.0);
        assert!(metrics.gpu_memory_mb.is_none());
    }

    #[test]
    fn test_process_metrics_missing_pid() {
        assert!(tracker().process_metrics(999_999_999).unwrap().is_none());
    }

    #[test]
    fn test_cache_clearing() {
        let tracker = tracker();
        let pid = std::process::id();
        let _ = tracker.process_metrics(pid);
        tracker.clear_cache();
        assert!(tracker.process_metrics(pid).unwrap().is_some());
    }

    #[test]
    fn test_expired_pids_are_pruned() {
        let tracker =
            ResourceTracker::with_gpu_monitor(Duration::from_millis(50), Box::new(NoOpGpuMonitor));
        for pid in [999_999_991, 999_999_992, 999_999_993] {
            let _ = tracker.process_metrics(pid);
        }
        assert_eq!(tracker.process_cache.read().unwrap().len(), 3);

        std::thread::sleep(Duration::from_millis(100));
        let _ = tracker.process_metrics(std::process::id());

        let cache = tracker.process_cache.read().unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key(&std::process::id()));
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 4), 25.0);
        assert_eq!(percent(5, 0), 0.0);
    }
}
