//! Builder for configuring a Supervisor.

use std::sync::Arc;

use crate::config::SupervisorSettings;
use crate::platform::{self, TreeTerminator};
use crate::process::CommandBuilder;
use crate::store::ConfigStore;
use crate::supervisor::state::SupervisorState;
use crate::system::MetricsProvider;
use crate::Supervisor;

/// Builder for configuring Supervisor initialization.
///
/// # Example
///
/// ```rust,ignore
/// use nexrift_core::{JsonConfigStore, ResourceTracker, Supervisor};
///
/// let store = Arc::new(JsonConfigStore::open_or_create("apps_config.json")?);
/// let supervisor = Supervisor::builder(store)
///     .with_metrics(Arc::new(ResourceTracker::default()))
///     .build();
/// ```
pub struct SupervisorBuilder {
    store: Arc<dyn ConfigStore>,
    metrics: Option<Arc<dyn MetricsProvider>>,
    terminator: Option<Arc<dyn TreeTerminator>>,
    commands: CommandBuilder,
    settings: SupervisorSettings,
}

impl SupervisorBuilder {
    /// Create a new builder around the app definition store.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            metrics: None,
            terminator: None,
            commands: CommandBuilder::default(),
            settings: SupervisorSettings::default(),
        }
    }

    /// Resource sampler used by status and server status.
    ///
    /// Default: none (resource fields are omitted)
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Process tree termination strategy.
    ///
    /// Default: [`platform::default_terminator`]
    pub fn with_terminator(mut self, terminator: Arc<dyn TreeTerminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn with_command_builder(mut self, commands: CommandBuilder) -> Self {
        self.commands = commands;
        self
    }

    /// Timing overrides (grace period, kill wait, restart settle delay).
    pub fn with_settings(mut self, settings: SupervisorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Supervisor {
        let terminator = self
            .terminator
            .unwrap_or_else(platform::default_terminator);
        Supervisor {
            state: Arc::new(SupervisorState::new(
                self.store,
                self.metrics,
                terminator,
                self.commands,
                self.settings,
            )),
        }
    }
}
