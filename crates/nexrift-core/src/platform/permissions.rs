//! Executable-bit handling for launch scripts.

use crate::error::Result;
use std::path::Path;
use tracing::debug;

/// Make a file executable.
///
/// # Platform Behavior
/// - **Linux/macOS**: Sets mode 0o755
/// - **Windows**: No-op (executability comes from the extension)
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = std::fs::metadata(path)?.permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(path, permissions)?;
        debug!("Set executable permissions on: {}", path.display());
    }

    #[cfg(windows)]
    {
        debug!("Skipping executable bit on Windows for: {}", path.display());
    }

    Ok(())
}

/// Whether a script can be run directly.
///
/// # Platform Behavior
/// - **Linux/macOS**: any execute bit is set
/// - **Windows**: extension is one of `.exe`, `.bat`, `.cmd`, `.com`
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(windows)]
    {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| matches!(ext.as_str(), "exe" | "bat" | "cmd" | "com"))
    }
}
