//! Configuration types for Mirror Deck
//!
//! Defines `Settings` (the parsed `config.toml`) and its sections.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application settings (`<config_dir>/mirror-deck/config.toml`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub adb: AdbSettings,

    #[serde(default)]
    pub scrcpy: ScrcpySettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

/// `[adb]` section: device enumeration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdbSettings {
    /// adb binary name or path
    #[serde(default = "default_adb_path")]
    pub path: String,

    /// Interval between presence polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for one `adb devices` run
    #[serde(default = "default_enumerate_timeout_ms")]
    pub enumerate_timeout_ms: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            path: default_adb_path(),
            poll_interval_ms: default_poll_interval_ms(),
            enumerate_timeout_ms: default_enumerate_timeout_ms(),
        }
    }
}

impl AdbSettings {
    pub fn poll_interval(&self) -> Duration {
        // A zero interval would make tokio::time::interval panic
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn enumerate_timeout(&self) -> Duration {
        Duration::from_millis(self.enumerate_timeout_ms)
    }
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_enumerate_timeout_ms() -> u64 {
    10_000
}

/// `[scrcpy]` section: mirroring sessions
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScrcpySettings {
    /// scrcpy binary name or path
    #[serde(default = "default_scrcpy_path")]
    pub path: String,

    /// Arguments prepended to every session's own arguments
    #[serde(default)]
    pub default_args: Vec<String>,

    /// How long to wait for a session process to exit after a stop
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl Default for ScrcpySettings {
    fn default() -> Self {
        Self {
            path: default_scrcpy_path(),
            default_args: Vec::new(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl ScrcpySettings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Combine configured defaults with per-session arguments
    pub fn session_args(&self, extra: &[String]) -> Vec<String> {
        self.default_args
            .iter()
            .chain(extra.iter())
            .cloned()
            .collect()
    }
}

fn default_scrcpy_path() -> String {
    "scrcpy".to_string()
}

fn default_stop_timeout_ms() -> u64 {
    2000
}

/// `[notifications]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotificationSettings {
    /// Forward completed transactions to the notification sink
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bound on one delivery attempt; past it the send is abandoned
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Use OS desktop notifications (requires the `desktop-notifications` feature)
    #[serde(default)]
    pub desktop: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            send_timeout_ms: default_send_timeout_ms(),
            desktop: false,
        }
    }
}

impl NotificationSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.adb.path, "adb");
        assert_eq!(settings.adb.poll_interval(), Duration::from_secs(2));
        assert_eq!(settings.scrcpy.path, "scrcpy");
        assert_eq!(settings.scrcpy.stop_timeout(), Duration::from_secs(2));
        assert!(settings.notifications.enabled);
        assert!(!settings.notifications.desktop);
        assert_eq!(
            settings.notifications.send_timeout(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[scrcpy]
default_args = ["--no-audio"]
"#,
        )
        .unwrap();
        assert_eq!(settings.scrcpy.path, "scrcpy");
        assert_eq!(settings.scrcpy.default_args, vec!["--no-audio"]);
        assert_eq!(settings.adb, AdbSettings::default());
    }

    #[test]
    fn test_session_args_order() {
        let scrcpy = ScrcpySettings {
            default_args: vec!["--no-audio".to_string()],
            ..Default::default()
        };
        assert_eq!(
            scrcpy.session_args(&["--max-size".to_string(), "1024".to_string()]),
            vec!["--no-audio", "--max-size", "1024"]
        );
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let adb = AdbSettings {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(adb.poll_interval(), Duration::from_millis(1));
    }
}
