//! Persistent app definitions.
//!
//! The supervisor only ever reads from the store; mutations come from the
//! config-management endpoints.

use super::atomic::{JsonFile, Loaded};
use crate::error::{NexriftError, Result};
use crate::models::AppConfig;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Source of app definitions.
pub trait ConfigStore: Send + Sync {
    /// Look up one app by id.
    fn get(&self, app_id: &str) -> Option<AppConfig>;

    /// All apps, in defined order.
    fn list(&self) -> Vec<AppConfig>;

    /// Insert or replace an app, keeping its position when replacing.
    fn put(&self, config: AppConfig) -> Result<()>;

    /// Remove an app. Returns whether it existed.
    fn delete(&self, app_id: &str) -> Result<bool>;

    fn contains(&self, app_id: &str) -> bool {
        self.get(app_id).is_some()
    }
}

fn upsert(apps: &mut Vec<AppConfig>, config: AppConfig) {
    match apps.iter_mut().find(|a| a.id == config.id) {
        Some(existing) => *existing = config,
        None => apps.push(config),
    }
}

/// Store backed by a JSON array on disk, saved atomically with a backup.
pub struct JsonConfigStore {
    file: JsonFile,
    apps: RwLock<Vec<AppConfig>>,
}

impl JsonConfigStore {
    /// Open the store at `path`.
    ///
    /// A missing file yields an empty store. A primary file that fails to
    /// parse is replaced in memory by its backup, if the backup is readable.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let file = JsonFile::new(path);
        let apps = match file.load::<Vec<AppConfig>>()? {
            Loaded::Primary(apps) => apps,
            Loaded::Backup(apps) => {
                warn!(
                    "Restored {} app definitions from {}",
                    apps.len(),
                    file.backup_path().display()
                );
                apps
            }
            Loaded::Missing => {
                debug!("No app config at {}", file.path().display());
                Vec::new()
            }
        };
        info!("Loaded {} app definitions from {}", apps.len(), file.path().display());
        Ok(Self {
            file,
            apps: RwLock::new(apps),
        })
    }

    /// Open the store, writing an empty file first if none exists.
    pub fn open_or_create(path: impl Into<PathBuf>) -> Result<Self> {
        let file = JsonFile::new(path);
        if !file.exists() {
            info!("Creating empty app config at {}", file.path().display());
            file.save(&Vec::<AppConfig>::new(), false)?;
        }
        Self::open(file.path().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn save(&self, apps: &[AppConfig]) -> Result<()> {
        self.file.save(&apps, true)
    }

    fn write_guard(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<AppConfig>>> {
        self.apps
            .write()
            .map_err(|_| NexriftError::Other("Failed to acquire config lock".into()))
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, app_id: &str) -> Option<AppConfig> {
        let apps = self.apps.read().ok()?;
        apps.iter().find(|a| a.id == app_id).cloned()
    }

    fn list(&self) -> Vec<AppConfig> {
        self.apps.read().map(|apps| apps.clone()).unwrap_or_default()
    }

    fn put(&self, config: AppConfig) -> Result<()> {
        config.validate()?;
        let mut apps = self.write_guard()?;
        let mut updated = apps.clone();
        upsert(&mut updated, config);
        // Memory is only updated once the file write succeeded.
        self.save(&updated)?;
        *apps = updated;
        Ok(())
    }

    fn delete(&self, app_id: &str) -> Result<bool> {
        let mut apps = self.write_guard()?;
        if !apps.iter().any(|a| a.id == app_id) {
            return Ok(false);
        }
        let updated: Vec<AppConfig> = apps.iter().filter(|a| a.id != app_id).cloned().collect();
        self.save(&updated)?;
        *apps = updated;
        Ok(true)
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryConfigStore {
    apps: RwLock<Vec<AppConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apps(apps: impl IntoIterator<Item = AppConfig>) -> Self {
        Self {
            apps: RwLock::new(apps.into_iter().collect()),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, app_id: &str) -> Option<AppConfig> {
        let apps = self.apps.read().ok()?;
        apps.iter().find(|a| a.id == app_id).cloned()
    }

    fn list(&self) -> Vec<AppConfig> {
        self.apps.read().map(|apps| apps.clone()).unwrap_or_default()
    }

    fn put(&self, config: AppConfig) -> Result<()> {
        config.validate()?;
        let mut apps = self
            .apps
            .write()
            .map_err(|_| NexriftError::Other("Failed to acquire config lock".into()))?;
        upsert(&mut apps, config);
        Ok(())
    }

    fn delete(&self, app_id: &str) -> Result<bool> {
        let mut apps = self
            .apps
            .write()
            .map_err(|_| NexriftError::Other("Failed to acquire config lock".into()))?;
        let before = apps.len();
        apps.retain(|a| a.id != app_id);
        Ok(apps.len() != before)
    }
}
