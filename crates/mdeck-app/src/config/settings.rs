//! Settings parser for config.toml

use std::path::{Path, PathBuf};

use super::types::Settings;
use mdeck_core::prelude::*;

const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "mirror-deck";

const DEFAULT_CONFIG: &str = r#"# Mirror Deck Configuration

[adb]
path = "adb"                # Binary name or absolute path
poll_interval_ms = 2000     # How often to check for connected devices
enumerate_timeout_ms = 10000

[scrcpy]
path = "scrcpy"
default_args = []           # e.g. ["--no-audio", "--max-size", "1024"]
stop_timeout_ms = 2000      # Wait for a session to exit after stop

[notifications]
enabled = true
send_timeout_ms = 5000      # Deliveries slower than this are abandoned
desktop = false             # Needs the desktop-notifications build feature
"#;

/// Directory holding Mirror Deck's config file
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

/// Default location of config.toml
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILENAME))
}

/// Load settings from the default location
pub fn load_default_settings() -> Settings {
    match default_config_path() {
        Some(path) => load_settings(&path),
        None => {
            debug!("No config directory on this platform, using defaults");
            Settings::default()
        }
    }
}

/// Load settings from `config_path`, or return defaults.
///
/// A missing file is normal. An unreadable or invalid file is logged and
/// ignored rather than treated as fatal.
pub fn load_settings(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create `dir` and a commented default config.toml inside it.
///
/// An existing config file is left untouched. Returns the file path.
pub fn init_config_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::config(format!("Failed to create {:?}: {}", dir, e)))?;
    }

    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        std::fs::write(&config_path, DEFAULT_CONFIG)
            .map_err(|e| Error::config(format!("Failed to write {:?}: {}", config_path, e)))?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_defaults() {
        let temp = tempdir().unwrap();
        let settings = load_settings(&temp.path().join(CONFIG_FILENAME));

        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);

        let config = r#"
[adb]
path = "/opt/platform-tools/adb"
poll_interval_ms = 500

[notifications]
enabled = false
"#;
        std::fs::write(&path, config).unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings.adb.path, "/opt/platform-tools/adb");
        assert_eq!(settings.adb.poll_interval_ms, 500);
        assert_eq!(settings.adb.enumerate_timeout_ms, 10_000);
        assert!(!settings.notifications.enabled);
        assert_eq!(settings.scrcpy.path, "scrcpy");
    }

    #[test]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "this is not [valid toml").unwrap();

        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn test_load_settings_wrong_type_falls_back() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[adb]\npoll_interval_ms = \"fast\"\n").unwrap();

        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn test_init_config_dir() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("mirror-deck");

        let path = init_config_dir(&dir).unwrap();
        assert!(path.exists());

        // The generated file must parse back to the defaults
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn test_init_config_dir_idempotent() {
        let temp = tempdir().unwrap();
        let path = init_config_dir(temp.path()).unwrap();
        std::fs::write(&path, "[adb]\npath = \"custom\"\n").unwrap();

        init_config_dir(temp.path()).unwrap();
        assert_eq!(load_settings(&path).adb.path, "custom");
    }
}
