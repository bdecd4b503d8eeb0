//! App definition management.

use tracing::info;

use crate::error::{NexriftError, Result};
use crate::models::AppConfig;
use crate::Supervisor;

impl Supervisor {
    // ========================================
    // Config Management Methods
    // ========================================

    /// All app definitions, in configuration order.
    pub fn list_apps(&self) -> Vec<AppConfig> {
        self.state.store.list()
    }

    /// Add a new app. Fails with `Validation` if the id is taken.
    pub async fn add_app(&self, config: AppConfig) -> Result<AppConfig> {
        config.validate()?;
        let lock = self.state.op_lock(&config.id);
        let _guard = lock.lock().await;

        if self.state.store.contains(&config.id) {
            return Err(NexriftError::Validation {
                field: "id".to_string(),
                message: format!("app '{}' already exists", config.id),
            });
        }
        self.state.store.put(config.clone())?;
        info!("Added app {} ({})", config.name, config.id);
        Ok(config)
    }

    /// Replace the definition of a stopped app.
    pub async fn update_app(&self, app_id: &str, mut config: AppConfig) -> Result<AppConfig> {
        if config.id.is_empty() {
            config.id = app_id.to_string();
        }
        if config.id != app_id {
            return Err(NexriftError::Validation {
                field: "id".to_string(),
                message: format!("body id '{}' does not match '{}'", config.id, app_id),
            });
        }
        config.validate()?;
        self.state.config(app_id)?;

        let lock = self.state.op_lock(app_id);
        let _guard = lock.lock().await;

        self.state.config(app_id)?;
        if self.state.live_pid(app_id).is_some() {
            return Err(NexriftError::AlreadyRunning {
                app_id: app_id.to_string(),
            });
        }
        self.state.store.put(config.clone())?;
        info!("Updated app {}", app_id);
        Ok(config)
    }

    /// Delete the definition of a stopped app, along with its last run record.
    pub async fn remove_app(&self, app_id: &str) -> Result<()> {
        self.state.config(app_id)?;
        let result = {
            let lock = self.state.op_lock(app_id);
            let _guard = lock.lock().await;
            self.remove_app_locked(app_id)
        };
        self.state.release_op_lock(app_id);
        result
    }

    fn remove_app_locked(&self, app_id: &str) -> Result<()> {
        self.state.config(app_id)?;
        if self.state.live_pid(app_id).is_some() {
            return Err(NexriftError::AlreadyRunning {
                app_id: app_id.to_string(),
            });
        }
        self.state.store.delete(app_id)?;
        self.state.registry.remove_finished(app_id);
        info!("Removed app {}", app_id);
        Ok(())
    }
}
