//! `adb devices` backed enumeration

use std::time::Duration;

use mdeck_core::prelude::*;
use mdeck_core::DeviceId;
use mdeck_daemon::discover_devices_with_timeout;

use super::DeviceEnumerator;
use crate::config::AdbSettings;

/// Enumerates devices by running `<adb> devices`
#[derive(Debug, Clone)]
pub struct AdbDeviceEnumerator {
    adb_path: String,
    timeout: Duration,
}

impl AdbDeviceEnumerator {
    pub fn new(adb_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            adb_path: adb_path.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &AdbSettings) -> Self {
        Self::new(settings.path.clone(), settings.enumerate_timeout())
    }

    pub fn adb_path(&self) -> &str {
        &self.adb_path
    }
}

impl DeviceEnumerator for AdbDeviceEnumerator {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceId>> {
        let result = discover_devices_with_timeout(&self.adb_path, self.timeout).await?;
        Ok(result.devices)
    }
}
