//! Tool availability checking
//!
//! Resolves the `adb` and `scrcpy` binaries once at startup so the CLI can
//! fail early with a helpful message instead of on the first poll.

use std::path::PathBuf;

/// Resolved locations of the external tools Mirror Deck drives
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    /// Resolved path to `adb`, if found
    pub adb_path: Option<PathBuf>,

    /// Resolved path to `scrcpy`, if found
    pub scrcpy_path: Option<PathBuf>,
}

impl ToolAvailability {
    /// Check tool availability for the configured binaries
    ///
    /// Each argument may be a bare name (looked up on `PATH`) or a path.
    pub fn check(adb: &str, scrcpy: &str) -> Self {
        Self {
            adb_path: Self::resolve(adb),
            scrcpy_path: Self::resolve(scrcpy),
        }
    }

    fn resolve(binary: &str) -> Option<PathBuf> {
        which::which(binary)
            .inspect_err(|e| tracing::debug!("{} not resolved: {}", binary, e))
            .ok()
    }

    /// Whether device enumeration can work
    pub fn has_adb(&self) -> bool {
        self.adb_path.is_some()
    }

    /// Whether mirroring sessions can be launched
    pub fn has_scrcpy(&self) -> bool {
        self.scrcpy_path.is_some()
    }

    /// Get user-friendly message for a missing adb
    pub fn adb_unavailable_message(&self) -> Option<&'static str> {
        if self.has_adb() {
            None
        } else {
            Some("adb not found. Install Android platform-tools or set [adb] path in config.toml.")
        }
    }

    /// Get user-friendly message for a missing scrcpy
    pub fn scrcpy_unavailable_message(&self) -> Option<&'static str> {
        if self.has_scrcpy() {
            None
        } else {
            Some("scrcpy not found. Install scrcpy or set [scrcpy] path in config.toml.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tools_have_messages() {
        let tools = ToolAvailability::check("/nonexistent/adb", "/nonexistent/scrcpy");
        assert!(!tools.has_adb());
        assert!(!tools.has_scrcpy());
        assert!(tools.adb_unavailable_message().is_some());
        assert!(tools.scrcpy_unavailable_message().is_some());
    }

    #[test]
    fn test_present_tool_resolves() {
        // `sh` stands in for a tool that is always on PATH in CI
        let tools = ToolAvailability::check("sh", "/nonexistent/scrcpy");
        assert!(tools.has_adb());
        assert!(tools.adb_unavailable_message().is_none());
        assert!(!tools.has_scrcpy());
    }
}
