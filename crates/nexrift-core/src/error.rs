//! Error types for the NexRift supervisor.
//!
//! Every failure carries the error kind plus enough diagnostic detail (resolved
//! command, working directory, underlying OS error) for operators. The HTTP
//! layer maps errors to status codes through [`NexriftError::http_status`] and
//! only ever exposes the display text and [`NexriftError::kind`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why a spawn attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnFailure {
    /// The executable or script does not exist.
    NotFound,
    /// The OS refused to execute the target.
    PermissionDenied,
    /// The working directory is missing or not a directory.
    BadWorkingDirectory,
    /// Any other spawn error.
    Other,
}

impl SpawnFailure {
    /// Classify an I/O error raised by the spawn call.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SpawnFailure::NotFound,
            std::io::ErrorKind::PermissionDenied => SpawnFailure::PermissionDenied,
            _ => SpawnFailure::Other,
        }
    }
}

impl fmt::Display for SpawnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpawnFailure::NotFound => "not found",
            SpawnFailure::PermissionDenied => "permission denied",
            SpawnFailure::BadWorkingDirectory => "bad working directory",
            SpawnFailure::Other => "spawn error",
        };
        f.write_str(s)
    }
}

/// Main error type for the supervisor core.
#[derive(Debug, Error)]
pub enum NexriftError {
    #[error("App not found: {app_id}")]
    ConfigNotFound { app_id: String },

    #[error("App is already running: {app_id}")]
    AlreadyRunning { app_id: String },

    #[error("App is not running: {app_id}")]
    NotRunning { app_id: String },

    #[error("Failed to start {app_id} ({reason}): {message} [command: {command}, working_dir: {working_dir:?}]")]
    SpawnFailed {
        app_id: String,
        reason: SpawnFailure,
        message: String,
        command: String,
        working_dir: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to terminate {app_id} (pid {pid}): {message}")]
    TerminationFailed {
        app_id: String,
        pid: u32,
        message: String,
    },

    #[error("Metrics unavailable: {message}")]
    MetricsUnavailable { message: String },

    #[error("Supervisor is shutting down")]
    ShuttingDown,

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, NexriftError>;

impl From<std::io::Error> for NexriftError {
    fn from(err: std::io::Error) -> Self {
        NexriftError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for NexriftError {
    fn from(err: serde_json::Error) -> Self {
        NexriftError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl NexriftError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        NexriftError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            NexriftError::ConfigNotFound { .. } => "config_not_found",
            NexriftError::AlreadyRunning { .. } => "already_running",
            NexriftError::NotRunning { .. } => "not_running",
            NexriftError::SpawnFailed { .. } => "spawn_failed",
            NexriftError::TerminationFailed { .. } => "termination_failed",
            NexriftError::MetricsUnavailable { .. } => "metrics_unavailable",
            NexriftError::ShuttingDown => "shutting_down",
            NexriftError::Validation { .. } => "validation",
            NexriftError::Io { .. } => "io",
            NexriftError::Json { .. } => "json",
            NexriftError::Other(_) => "internal",
        }
    }

    /// HTTP status code for this error.
    ///
    /// - 400: validation
    /// - 404: unknown app
    /// - 409: state conflicts (already running / not running)
    /// - 503: shutting down
    /// - 500: everything else (spawn, termination, IO)
    pub fn http_status(&self) -> u16 {
        match self {
            NexriftError::Validation { .. } => 400,
            NexriftError::ConfigNotFound { .. } => 404,
            NexriftError::AlreadyRunning { .. } | NexriftError::NotRunning { .. } => 409,
            NexriftError::ShuttingDown => 503,
            _ => 500,
        }
    }

    /// Whether the error is caused by the client request rather than the host.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}
