//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live in this module rather
//! than scattered through the supervisor:
//! - `permissions` - executable-bit checks used when resolving scripts
//! - `process` - process groups, liveness probes and tree termination
//!
//! # Supported Platforms
//!
//! - **Linux / macOS**: process groups and `killpg`
//! - **Windows**: new process groups and `taskkill /T`

pub mod permissions;
pub mod process;

pub use permissions::{is_executable, set_executable};
pub use process::{
    configure_process_group, default_terminator, is_process_alive, TreeTerminator,
};

#[cfg(unix)]
pub use process::ProcessGroupTerminator;
#[cfg(windows)]
pub use process::TaskkillTerminator;

/// Executable names for the interpreter and environment runner.
pub fn interpreter_names() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("python.exe", "conda.exe")
    } else {
        ("python", "conda")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpreter_names() {
        let (python, conda) = interpreter_names();
        #[cfg(unix)]
        {
            assert_eq!(python, "python");
            assert_eq!(conda, "conda");
        }
        #[cfg(windows)]
        {
            assert_eq!(python, "python.exe");
            assert_eq!(conda, "conda.exe");
        }
    }
}
