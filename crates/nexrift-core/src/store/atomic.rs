//! Crash-safe JSON files with a rolling backup.
//!
//! A save stages the new contents in a fsynced temp file, copies the current
//! file to `<name>.json.bak`, then renames the temp file into place. If the
//! backup cannot be written the save is abandoned and the current file is left
//! untouched, so at every point at least one complete copy of the last good
//! set exists on disk. [`JsonFile::load`] falls back to that copy when the
//! primary is missing or torn.

use crate::config::PathsConfig;
use crate::error::{NexriftError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Path of the backup kept next to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    path.with_extension(PathsConfig::BACKUP_EXTENSION)
}

/// Which copy a [`JsonFile::load`] came from.
#[derive(Debug, PartialEq)]
pub enum Loaded<T> {
    Primary(T),
    /// The primary was missing or unreadable.
    Backup(T),
    /// Neither file exists.
    Missing,
}

/// A JSON document persisted at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        backup_path(&self.path)
    }

    /// Whether either the primary or the backup exists.
    pub fn exists(&self) -> bool {
        self.path.exists() || self.backup_path().exists()
    }

    /// Parse the primary file, falling back to the backup.
    ///
    /// Fails only when the primary is unreadable and no usable backup exists.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Loaded<T>> {
        let primary_err = match read_json(&self.path) {
            Ok(Some(value)) => return Ok(Loaded::Primary(value)),
            Ok(None) => None,
            Err(e) => {
                warn!("{} is unreadable: {}", self.path.display(), e);
                Some(e)
            }
        };

        let backup = self.backup_path();
        match (read_json(&backup), primary_err) {
            (Ok(Some(value)), _) => {
                warn!("Using backup {}", backup.display());
                Ok(Loaded::Backup(value))
            }
            (Ok(None), None) => Ok(Loaded::Missing),
            (Ok(None), Some(err)) => Err(err),
            (Err(backup_err), None) => Err(backup_err),
            (Err(backup_err), Some(err)) => {
                warn!("Backup {} is unreadable too: {}", backup.display(), backup_err);
                Err(err)
            }
        }
    }

    /// Replace the file contents with `data`.
    ///
    /// With `keep_backup`, the current file is copied to the backup first; a
    /// failed copy aborts the save.
    pub fn save<T: Serialize>(&self, data: &T, keep_backup: bool) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(data)?;
        // Refuse to persist anything that would not load again.
        serde_json::from_slice::<serde_json::Value>(&serialized)?;

        ensure_parent(&self.path)?;
        let staged = stage(&self.path, &serialized)?;

        if keep_backup && self.path.exists() {
            let backup = self.backup_path();
            if let Err(e) = fs::copy(&self.path, &backup) {
                let _ = fs::remove_file(&staged);
                return Err(NexriftError::io_with_path(e, backup));
            }
            debug!("Backed up {} to {}", self.path.display(), backup.display());
        }

        if let Err(e) = fs::rename(&staged, &self.path) {
            let _ = fs::remove_file(&staged);
            return Err(NexriftError::io_with_path(e, self.path.clone()));
        }
        debug!("Saved {}", self.path.display());
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(NexriftError::io_with_path(e, path)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| NexriftError::Json {
            message: format!("{}: {}", path.display(), e),
            source: Some(e),
        })
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            fs::create_dir_all(parent).map_err(|e| NexriftError::io_with_path(e, parent))
        }
        _ => Ok(()),
    }
}

/// Write `bytes` to a fresh sibling temp file and fsync it.
fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let staged = path.with_extension(format!(
        "json.{}-{}.tmp",
        std::process::id(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    ));

    let written = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&staged)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        });
    if let Err(e) = written {
        let _ = fs::remove_file(&staged);
        return Err(NexriftError::io_with_path(e, staged));
    }
    Ok(staged)
}
