//! App definitions as persisted by the config store.

use crate::config::AppConfigDefaults;
use crate::error::{NexriftError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How an app is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaunchKind {
    /// `python <path>`.
    #[serde(rename = "python")]
    DirectInterpreter,
    /// `conda run -n <env> python <path>`, or plain python for the base env.
    #[serde(rename = "conda")]
    NamedEnvironment,
    /// A binary resolved against the working directory.
    #[serde(rename = "executable")]
    Executable,
    /// A batch/shell script run through the platform shell.
    #[serde(rename = "batch", alias = "script", alias = "shell")]
    ShellScript,
}

impl LaunchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchKind::DirectInterpreter => "python",
            LaunchKind::NamedEnvironment => "conda",
            LaunchKind::Executable => "executable",
            LaunchKind::ShellScript => "batch",
        }
    }
}

impl Default for LaunchKind {
    fn default() -> Self {
        LaunchKind::DirectInterpreter
    }
}

impl fmt::Display for LaunchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of a supervised app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Unique key, used in API paths.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Launch kind. Older config files omit it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<LaunchKind>,
    /// Named interpreter environment (conda env name).
    #[serde(default)]
    pub environment: Option<String>,
    /// Executable or script path, absolute or relative to `working_dir`.
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub port: u16,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_folder: Option<PathBuf>,
}

impl AppConfig {
    /// Create a config with the required fields; everything else defaults.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: LaunchKind,
        path: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: Some(kind),
            environment: None,
            path: path.into(),
            args: Vec::new(),
            port,
            description: String::new(),
            working_dir: None,
            output_folder: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    /// Effective launch kind.
    ///
    /// Configs without a `type` fall back to the named-environment launcher
    /// when an environment is given, otherwise to the plain interpreter.
    pub fn launch_kind(&self) -> LaunchKind {
        match self.kind {
            Some(kind) => kind,
            None if self.environment.as_deref().is_some_and(|e| !e.is_empty()) => {
                LaunchKind::NamedEnvironment
            }
            None => LaunchKind::DirectInterpreter,
        }
    }

    /// Working directory, defaulting to the parent of `path`.
    pub fn effective_working_dir(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => Path::new(&self.path)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }

    /// Whether the configured environment is unset or the base environment.
    pub fn uses_base_environment(&self) -> bool {
        match self.environment.as_deref() {
            None | Some("") => true,
            Some(env) => env == AppConfigDefaults::BASE_ENVIRONMENT,
        }
    }

    /// Check the fields the supervisor relies on.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(NexriftError::Validation {
                field: "id".into(),
                message: "must not be empty".into(),
            });
        }
        if self.id.contains(['/', '\\']) || self.id.chars().any(char::is_whitespace) {
            return Err(NexriftError::Validation {
                field: "id".into(),
                message: format!("'{}' must not contain slashes or whitespace", self.id),
            });
        }
        if self.name.trim().is_empty() {
            return Err(NexriftError::Validation {
                field: "name".into(),
                message: "must not be empty".into(),
            });
        }
        if self.path.trim().is_empty() {
            return Err(NexriftError::Validation {
                field: "path".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }
}
