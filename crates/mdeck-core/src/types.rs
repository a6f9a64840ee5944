//! Core domain types: device identity and log entries

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Number of lines retained per device and for the system channel
pub const MAX_LOG_LINES: usize = 1000;

// ─────────────────────────────────────────────────────────
// Device Identity
// ─────────────────────────────────────────────────────────

/// Opaque identifier for a device (the adb serial).
///
/// Stable for the lifetime of a connection and reused when the same
/// device reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&DeviceId> for DeviceId {
    fn from(id: &DeviceId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ─────────────────────────────────────────────────────────
// Log Entries
// ─────────────────────────────────────────────────────────

/// Counter for generating unique log entry IDs
static LOG_ENTRY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DBG",
            LogLevel::Info => "INF",
            LogLevel::Warning => "WRN",
            LogLevel::Error => "ERR",
        }
    }

    /// Guess the level of a raw line written by the mirroring process.
    ///
    /// The process prefixes its own diagnostics with `INFO:`/`WARN:`/`ERROR:`;
    /// anything else inherits the level of the stream it arrived on.
    pub fn detect(line: &str, from_stderr: bool) -> Self {
        let trimmed = line.trim_start();
        if trimmed.starts_with("ERROR:") || trimmed.starts_with("adb: failed") {
            LogLevel::Error
        } else if trimmed.starts_with("WARN:") {
            LogLevel::Warning
        } else if trimmed.starts_with("DEBUG:") || trimmed.starts_with("VERBOSE:") {
            LogLevel::Debug
        } else if trimmed.starts_with("INFO:") {
            LogLevel::Info
        } else if from_stderr {
            LogLevel::Warning
        } else {
            LogLevel::Info
        }
    }
}

/// Origin of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// Standard output of a mirroring process
    Stdout,
    /// Standard error of a mirroring process
    Stderr,
    /// Emitted by the coordinator itself
    System,
}

impl LogSource {
    pub fn prefix(&self) -> &'static str {
        match self {
            LogSource::Stdout => "out",
            LogSource::Stderr => "err",
            LogSource::System => "sys",
        }
    }
}

/// Represents a log entry with timestamp
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub source: LogSource,
    pub message: String,
    /// Unique, monotonically increasing ID (arrival order across all buffers)
    pub id: u64,
}

impl LogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(level: LogLevel, source: LogSource, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            source,
            message: message.into(),
            id: LOG_ENTRY_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Create an info log entry
    pub fn info(source: LogSource, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, source, message)
    }

    /// Create an error log entry
    pub fn error(source: LogSource, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, source, message)
    }

    /// Create a warning log entry
    pub fn warn(source: LogSource, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, source, message)
    }

    /// Format timestamp for display
    pub fn formatted_time(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }

    /// Format for single-line display
    pub fn display_line(&self) -> String {
        format!(
            "{} {} [{}] {}",
            self.formatted_time(),
            self.level.prefix(),
            self.source.prefix(),
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_device_id_borrows_as_str() {
        let mut set = HashSet::new();
        set.insert(DeviceId::from("emulator-5554"));
        assert!(set.contains("emulator-5554"));
    }

    #[test]
    fn test_device_id_serializes_transparently() {
        let id = DeviceId::new("R58M123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"R58M123\"");
        assert_eq!(id.to_string(), "R58M123");
    }

    #[test]
    fn test_detect_level_from_prefix() {
        assert_eq!(LogLevel::detect("INFO: Renderer: opengl", true), LogLevel::Info);
        assert_eq!(
            LogLevel::detect("ERROR: Failed to install /a.apk", false),
            LogLevel::Error
        );
        assert_eq!(
            LogLevel::detect("adb: failed to install /a.apk", false),
            LogLevel::Error
        );
        assert_eq!(LogLevel::detect("WARN: Demuxer error", false), LogLevel::Warning);
    }

    #[test]
    fn test_detect_level_falls_back_to_stream() {
        assert_eq!(LogLevel::detect("[server] something", true), LogLevel::Warning);
        assert_eq!(LogLevel::detect("scrcpy 2.4", false), LogLevel::Info);
    }

    #[test]
    fn test_log_entry_ids_increase() {
        let a = LogEntry::info(LogSource::System, "first");
        let b = LogEntry::info(LogSource::System, "second");
        assert!(b.id > a.id);
    }

    #[test]
    fn test_display_line_format() {
        let entry = LogEntry::error(LogSource::Stderr, "boom");
        let line = entry.display_line();
        assert!(line.contains("ERR [err] boom"));
    }
}
