//! Launch command resolution.
//!
//! Maps an [`AppConfig`] to the argv and working directory the supervisor
//! spawns. Resolution only touches the filesystem to check existence.

use crate::error::{NexriftError, Result, SpawnFailure};
use crate::models::{AppConfig, CommandPreview, LaunchKind};
use crate::platform;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

/// Fully resolved launch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl ResolvedCommand {
    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Space-joined command line for logs and responses.
    pub fn display(&self) -> String {
        self.argv().join(" ")
    }

    /// Build the spawnable command: piped output, null stdin, own process group.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        platform::configure_process_group(&mut cmd);
        cmd
    }
}

/// Resolves app configs into launch commands.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    interpreter: String,
    env_runner: String,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        let (interpreter, env_runner) = platform::interpreter_names();
        Self {
            interpreter: interpreter.to_string(),
            env_runner: env_runner.to_string(),
        }
    }
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the interpreter executable (`python`).
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Override the environment runner executable (`conda`).
    pub fn with_env_runner(mut self, runner: impl Into<String>) -> Self {
        self.env_runner = runner.into();
        self
    }

    /// Resolve the command for `config`.
    pub fn build(&self, config: &AppConfig) -> Result<ResolvedCommand> {
        let working_dir = config.effective_working_dir();

        let (program, mut args) = match config.launch_kind() {
            LaunchKind::Executable => {
                let target = self.resolve_existing(config, &working_dir, "Executable")?;
                (target.to_string_lossy().into_owned(), Vec::new())
            }
            LaunchKind::ShellScript => {
                let script = self.resolve_existing(config, &working_dir, "Script")?;
                shell_invocation(&script)
            }
            LaunchKind::NamedEnvironment if !config.uses_base_environment() => {
                let env = config.environment.clone().unwrap_or_default();
                (
                    self.env_runner.clone(),
                    vec![
                        "run".to_string(),
                        "-n".to_string(),
                        env,
                        self.interpreter.clone(),
                        config.path.clone(),
                    ],
                )
            }
            LaunchKind::NamedEnvironment | LaunchKind::DirectInterpreter => {
                (self.interpreter.clone(), vec![config.path.clone()])
            }
        };

        // Configured args only follow binaries and scripts.
        if matches!(
            config.launch_kind(),
            LaunchKind::Executable | LaunchKind::ShellScript
        ) {
            args.extend(config.args.iter().cloned());
        }

        Ok(ResolvedCommand {
            program,
            args,
            working_dir,
        })
    }

    /// Dry-run resolution for display; never fails.
    pub fn preview(&self, config: &AppConfig) -> CommandPreview {
        let working_dir = config.effective_working_dir();
        let main_path = resolve_path(&working_dir, Path::new(&config.path));

        let (command, error) = match self.build(config) {
            Ok(resolved) => (Some(resolved.argv()), None),
            Err(e) => (None, Some(e.to_string())),
        };

        CommandPreview {
            app_id: config.id.clone(),
            name: config.name.clone(),
            kind: config.launch_kind(),
            command,
            error,
            working_dir_exists: working_dir.is_dir(),
            working_dir,
            main_path_exists: main_path.exists(),
        }
    }

    fn resolve_existing(
        &self,
        config: &AppConfig,
        working_dir: &Path,
        what: &str,
    ) -> Result<PathBuf> {
        let target = resolve_path(working_dir, Path::new(&config.path));
        if target.exists() {
            Ok(target)
        } else {
            Err(NexriftError::SpawnFailed {
                app_id: config.id.clone(),
                reason: SpawnFailure::NotFound,
                message: format!("{} not found: {}", what, target.display()),
                command: target.to_string_lossy().into_owned(),
                working_dir: working_dir.to_path_buf(),
                source: None,
            })
        }
    }
}

#[cfg(windows)]
fn shell_invocation(script: &Path) -> (String, Vec<String>) {
    (
        "cmd.exe".to_string(),
        vec!["/c".to_string(), script.to_string_lossy().into_owned()],
    )
}

#[cfg(not(windows))]
fn shell_invocation(script: &Path) -> (String, Vec<String>) {
    let script = script.to_string_lossy().into_owned();
    if platform::is_executable(Path::new(&script)) {
        (script, Vec::new())
    } else {
        ("sh".to_string(), vec![script])
    }
}

/// Join a relative `path` onto `base` and normalize the result.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Lexically collapse `.` and `..` components without touching the disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
