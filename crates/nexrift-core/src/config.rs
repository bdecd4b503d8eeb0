//! Centralized configuration for the NexRift supervisor.
//!
//! Runtime tunables live here as constants; [`SupervisorSettings`] bundles the
//! ones a caller may override when building a supervisor.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfigDefaults;

impl AppConfigDefaults {
    pub const APP_NAME: &'static str = "NexRift";
    pub const BASE_ENVIRONMENT: &'static str = "base";
    pub const DEFAULT_PORT: u16 = 8000;
}

/// Process lifecycle timing.
pub struct SupervisorConfig;

impl SupervisorConfig {
    /// Wait after a polite termination request before escalating.
    pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);
    /// Wait after a forced kill for the exit to be observed.
    pub const KILL_WAIT: Duration = Duration::from_secs(5);
    /// Pause between stop and start on restart so ports are released.
    pub const RESTART_SETTLE_DELAY: Duration = Duration::from_secs(2);
    /// Upper bound on a single metrics sample inside status().
    pub const METRICS_TIMEOUT: Duration = Duration::from_secs(1);
    /// How long the exit monitor waits for pipes to drain after exit.
    pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
    /// Bound on joining exit monitors during shutdown.
    pub const MONITOR_JOIN_TIMEOUT: Duration = Duration::from_secs(10);
    /// Captured output kept per stream (tail).
    pub const OUTPUT_CAPTURE_LIMIT: usize = 1024 * 1024;
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const PORT_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
    pub const PORT_CHECK_HOST: &'static str = "127.0.0.1";
}

/// File names used for persisted state.
pub struct PathsConfig;

impl PathsConfig {
    pub const CONFIG_FILE_NAME: &'static str = "apps_config.json";
    pub const CONFIG_DIR_NAME: &'static str = "nexrift";
    pub const BACKUP_EXTENSION: &'static str = "json.bak";
}

/// Timing knobs for a [`crate::Supervisor`] instance.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub grace_period: Duration,
    pub kill_wait: Duration,
    pub restart_settle: Duration,
    pub metrics_timeout: Duration,
    pub port_check_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_period: SupervisorConfig::STOP_GRACE_PERIOD,
            kill_wait: SupervisorConfig::KILL_WAIT,
            restart_settle: SupervisorConfig::RESTART_SETTLE_DELAY,
            metrics_timeout: SupervisorConfig::METRICS_TIMEOUT,
            port_check_timeout: NetworkConfig::PORT_CHECK_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(SupervisorConfig::STOP_GRACE_PERIOD > Duration::ZERO);
        assert!(SupervisorConfig::METRICS_TIMEOUT <= Duration::from_secs(1));
        assert!(SupervisorConfig::OUTPUT_CAPTURE_LIMIT > 0);
    }

    #[test]
    fn test_default_settings_match_constants() {
        let settings = SupervisorSettings::default();
        assert_eq!(settings.grace_period, SupervisorConfig::STOP_GRACE_PERIOD);
        assert_eq!(settings.restart_settle, SupervisorConfig::RESTART_SETTLE_DELAY);
    }
}
