//! NexRift Core - process-lifecycle supervisor for long-running local apps.
//!
//! This crate starts, stops, restarts and reports on a small, statically
//! configured set of external applications. It can be embedded directly; the
//! `nexrift-server` crate exposes it over HTTP.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nexrift_core::{JsonConfigStore, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> nexrift_core::Result<()> {
//!     let store = Arc::new(JsonConfigStore::open_or_create("apps_config.json")?);
//!     let supervisor = Supervisor::builder(store).build();
//!
//!     let started = supervisor.start("comfyui").await?;
//!     println!("Started pid {}", started.pid);
//!
//!     supervisor.stop("comfyui").await?;
//!     supervisor.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod platform;
pub mod process;
pub mod store;
pub mod system;

mod supervisor;

// Re-export commonly used types
pub use config::SupervisorSettings;
pub use error::{NexriftError, Result, SpawnFailure};
pub use models::{
    ApiResponse, AppConfig, AppStatus, CommandPreview, HealthReport, LaunchKind, LogsResponse,
    RunState, ServerStatusResponse, StartResponse,
};
pub use platform::TreeTerminator;
pub use process::{CommandBuilder, ProcessRegistry, ProcessState, ResolvedCommand};
pub use store::{ConfigStore, JsonConfigStore, MemoryConfigStore};
pub use system::{HostMetrics, MetricsProvider, ProcessMetrics, ResourceTracker};

pub use supervisor::{ShutdownCoordinator, ShutdownReport, SupervisorBuilder};

use std::sync::Arc;

use supervisor::SupervisorState;

/// Main entry point for supervising apps.
///
/// Cheap to clone; clones share the same process table, so a handle can be
/// passed to request handlers and the shutdown path alike.
#[derive(Clone)]
pub struct Supervisor {
    state: Arc<SupervisorState>,
}

impl Supervisor {
    /// Create a builder for a Supervisor.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let supervisor = Supervisor::builder(Arc::new(MemoryConfigStore::new()))
    ///     .with_settings(SupervisorSettings::default())
    ///     .build();
    /// ```
    pub fn builder(store: Arc<dyn ConfigStore>) -> SupervisorBuilder {
        SupervisorBuilder::new(store)
    }

    /// Create a supervisor with default settings and no metrics provider.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::builder(store).build()
    }

    /// Timing settings in effect.
    pub fn settings(&self) -> &SupervisorSettings {
        &self.state.settings
    }
}
