//! Device discovery using the `adb devices` command

use std::collections::BTreeSet;
use std::process::Stdio;
use std::time::{Duration, Instant};

use mdeck_core::prelude::*;
use mdeck_core::DeviceId;
use tokio::process::Command;
use tokio::time::timeout;

/// Default timeout for the adb devices command
pub const DEVICES_TIMEOUT: Duration = Duration::from_secs(10);

/// Header line printed by `adb devices`
const LIST_HEADER: &str = "List of devices attached";

/// Connection state reported for a device that is ready for use
const READY_STATE: &str = "device";

/// Result of device discovery
#[derive(Debug, Clone)]
pub struct DeviceDiscoveryResult {
    /// Serials of devices in the `device` state, sorted and deduplicated
    pub devices: Vec<DeviceId>,

    /// Time taken to discover devices
    pub elapsed: Duration,
}

/// Discover connected devices with the given adb binary
pub async fn discover_devices(adb_path: &str) -> Result<DeviceDiscoveryResult> {
    discover_devices_with_timeout(adb_path, DEVICES_TIMEOUT).await
}

/// Discover devices with a custom timeout
pub async fn discover_devices_with_timeout(
    adb_path: &str,
    timeout_duration: Duration,
) -> Result<DeviceDiscoveryResult> {
    let start = Instant::now();

    debug!("Enumerating devices with {} devices", adb_path);

    let stdout = timeout(timeout_duration, run_adb_devices(adb_path))
        .await
        .map_err(|_| Error::process("Device enumeration timed out"))??;

    let devices = parse_devices_output(&stdout);
    let elapsed = start.elapsed();

    debug!("Enumerated {} devices in {:?}", devices.len(), elapsed);

    Ok(DeviceDiscoveryResult { devices, elapsed })
}

/// Run `adb devices` and return its stdout
async fn run_adb_devices(adb_path: &str) -> Result<String> {
    let output = Command::new(adb_path)
        .arg("devices")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(adb_path)
            } else {
                Error::process(format!("Failed to run adb devices: {}", e))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::process(format!(
            "adb devices failed with exit code {:?}: {}",
            output.status.code(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse the output of `adb devices`
///
/// Rows look like `R58M123ABC\tdevice`. Rows in other states
/// (`offline`, `unauthorized`, `no permissions`) are not usable for a
/// session and are skipped, as are the header, blank lines and the
/// `* daemon started successfully` chatter adb prints on first use.
pub fn parse_devices_output(output: &str) -> Vec<DeviceId> {
    let mut devices = BTreeSet::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line == LIST_HEADER || line.starts_with('*') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(serial), Some(state)) = (fields.next(), fields.next()) else {
            continue;
        };

        if state == READY_STATE {
            devices.insert(DeviceId::from(serial));
        } else {
            trace!("Skipping device {} in state {}", serial, state);
        }
    }

    devices.into_iter().collect()
}
