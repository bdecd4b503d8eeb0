//! Platform-specific process management.
//!
//! Supervised apps are spawned as leaders of their own process group so the
//! whole tree can be signalled at once. [`TreeTerminator`] wraps the two-step
//! polite/forced teardown for each platform.

use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

/// Terminate an OS process together with everything it spawned.
///
/// Implementations treat "no such process" as success.
pub trait TreeTerminator: Send + Sync {
    /// Ask the tree rooted at `pid` to exit.
    fn request_stop(&self, pid: u32) -> io::Result<()>;

    /// Kill the tree rooted at `pid` unconditionally.
    fn force_kill(&self, pid: u32) -> io::Result<()>;

    /// Whether `pid` still refers to a live process.
    fn is_alive(&self, pid: u32) -> bool {
        is_process_alive(pid)
    }

    /// Pids of every process currently descended from `pid`.
    fn descendants(&self, pid: u32) -> Vec<u32> {
        collect_descendants(pid)
    }
}

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: `kill(pid, 0)`; zombies count as dead on Linux
/// - **Windows**: `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => !is_zombie(pid),
            // Exists but owned by someone else.
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        windows_impl::is_alive(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        true
    }
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // State is the first field after the parenthesized command name.
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            let rest = &stat[stat.rfind(')')? + 1..];
            rest.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

/// Put a command into its own process group before spawning.
///
/// # Platform Behavior
/// - **Linux/macOS**: `setpgid(0, 0)` in the child, so pgid == pid
/// - **Windows**: `CREATE_NEW_PROCESS_GROUP`
pub fn configure_process_group(cmd: &mut tokio::process::Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
}

/// Terminator for the current platform.
pub fn default_terminator() -> Arc<dyn TreeTerminator> {
    #[cfg(unix)]
    {
        Arc::new(ProcessGroupTerminator)
    }

    #[cfg(windows)]
    {
        Arc::new(TaskkillTerminator)
    }
}

/// Recursively collect all descendant PIDs of a process.
fn collect_descendants(pid: u32) -> Vec<u32> {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut descendants = Vec::new();
    let mut to_check = vec![Pid::from_u32(pid)];
    while let Some(parent) = to_check.pop() {
        for (child_pid, process) in system.processes() {
            let child = child_pid.as_u32();
            if process.parent() == Some(parent) && child != pid && !descendants.contains(&child)
            {
                descendants.push(child);
                to_check.push(*child_pid);
            }
        }
    }
    descendants
}

/// POSIX strategy: signal the process group led by the app.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessGroupTerminator;

#[cfg(unix)]
impl ProcessGroupTerminator {
    fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        debug!("Sending {:?} to process group {}", signal, pid);
        match killpg(Pid::from_raw(raw), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

#[cfg(unix)]
impl TreeTerminator for ProcessGroupTerminator {
    fn request_stop(&self, pid: u32) -> io::Result<()> {
        Self::signal_group(pid, nix::sys::signal::Signal::SIGTERM)
    }

    fn force_kill(&self, pid: u32) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // Collect before killing; parent links are lost once the tree dies.
        let descendants = collect_descendants(pid);
        Self::signal_group(pid, Signal::SIGKILL)?;

        // `pid` may not lead a group, e.g. an orphan left by a dead leader.
        for child in std::iter::once(pid).chain(descendants) {
            let Ok(raw) = i32::try_from(child) else {
                continue;
            };
            // Children that called setsid() escaped the group.
            if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGKILL) {
                if e != nix::errno::Errno::ESRCH {
                    warn!("Failed to kill {} (tree of {}): {}", child, pid, e);
                }
            }
        }
        Ok(())
    }
}

/// Windows strategy: `taskkill /T`, then `taskkill /F /T`.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskkillTerminator;

#[cfg(windows)]
impl TaskkillTerminator {
    fn taskkill(pid: u32, force: bool) -> io::Result<()> {
        use std::process::Command;

        let pid_arg = pid.to_string();
        let mut args = vec!["/PID", pid_arg.as_str(), "/T"];
        if force {
            args.push("/F");
        }
        debug!("Running taskkill {:?}", args);

        let output = Command::new("taskkill").args(&args).output()?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        // "not found" errors are OK - process already dead
        if stderr.contains("not found") || stderr.contains("not running") {
            Ok(())
        } else if !force {
            // Console apps without a window ignore the polite request; the
            // forced path handles them.
            debug!("taskkill /T for {} did not succeed: {}", pid, stderr.trim());
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Other, stderr.trim().to_string()))
        }
    }
}

#[cfg(windows)]
impl TreeTerminator for TaskkillTerminator {
    fn request_stop(&self, pid: u32) -> io::Result<()> {
        Self::taskkill(pid, false)
    }

    fn force_kill(&self, pid: u32) -> io::Result<()> {
        let descendants = collect_descendants(pid);
        Self::taskkill(pid, true)?;
        for child in descendants {
            if is_process_alive(child) {
                let _ = Self::taskkill(child, true);
            }
        }
        Ok(())
    }
}

#[cfg(windows)]
mod windows_impl {
    #![allow(unsafe_code)]

    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    pub(super) fn is_alive(pid: u32) -> bool {
        // SAFETY: OpenProcess has no preconditions on its arguments; the
        // returned handle is checked for null and closed exactly once.
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                false
            } else {
                CloseHandle(handle);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(4_000_000_000));
    }

    #[test]
    fn test_terminate_nonexistent_is_ok() {
        let terminator = default_terminator();
        assert!(terminator.request_stop(3_999_999).is_ok());
        assert!(terminator.force_kill(3_999_999).is_ok());
    }

    #[cfg(unix)]
    fn spawn_tree() -> std::process::Child {
        use std::os::unix::process::CommandExt;
        std::process::Command::new("sh")
            .args(["-c", "sleep 30 & sleep 30 & wait"])
            .process_group(0)
            .spawn()
            .unwrap()
    }

    #[cfg(unix)]
    fn wait_until_dead(pids: &[u32]) -> bool {
        for _ in 0..50 {
            if pids.iter().all(|&p| !is_process_alive(p)) {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        false
    }

    #[test]
    #[cfg(unix)]
    fn test_request_stop_kills_group() {
        let mut child = spawn_tree();
        let pid = child.id();
        std::thread::sleep(std::time::Duration::from_millis(300));
        let descendants = collect_descendants(pid);
        assert!(!descendants.is_empty());

        ProcessGroupTerminator.request_stop(pid).unwrap();
        child.wait().unwrap();
        assert!(wait_until_dead(&descendants));
    }

    #[test]
    #[cfg(unix)]
    fn test_force_kill_reaches_term_ignoring_tree() {
        use std::os::unix::process::CommandExt;
        let mut child = std::process::Command::new("sh")
            .args(["-c", "trap '' TERM; sleep 30 & wait"])
            .process_group(0)
            .spawn()
            .unwrap();
        let pid = child.id();
        std::thread::sleep(std::time::Duration::from_millis(300));
        let descendants = collect_descendants(pid);

        ProcessGroupTerminator.request_stop(pid).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(300));
        assert!(ProcessGroupTerminator.is_alive(pid));

        ProcessGroupTerminator.force_kill(pid).unwrap();
        child.wait().unwrap();
        assert!(wait_until_dead(&descendants));
    }

    #[test]
    #[cfg(unix)]
    fn test_force_kill_reaches_non_leader() {
        let mut child = spawn_tree();
        let pid = child.id();
        std::thread::sleep(std::time::Duration::from_millis(300));
        let descendants = ProcessGroupTerminator.descendants(pid);
        let member = descendants[0];

        ProcessGroupTerminator.force_kill(member).unwrap();
        assert!(wait_until_dead(&[member]));
        assert!(ProcessGroupTerminator.is_alive(pid));

        ProcessGroupTerminator.force_kill(pid).unwrap();
        child.wait().unwrap();
        assert!(wait_until_dead(&descendants));
    }
}
