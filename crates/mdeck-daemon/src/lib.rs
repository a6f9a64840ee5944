//! # mdeck-daemon - adb/scrcpy Process Management
//!
//! Runs `adb devices` for enumeration, spawns and terminates `scrcpy`
//! mirroring processes, and classifies their output lines.
//!
//! Depends on [`mdeck_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Management
//! - [`MirrorProcess`] - Spawn and manage one `scrcpy` child process
//!
//! ### Protocol Parsing
//! - [`parse_log_line()`] - Classify one line of mirroring output as an install/push event
//!
//! ### Device Discovery
//! - [`discover_devices()`] - List ready devices via `adb devices`
//! - [`parse_devices_output()`] - Parse raw `adb devices` output
//! - [`PresenceMonitor`] - Poll enumeration and emit connect/disconnect batches
//! - [`diff_device_sets()`] - Pure snapshot diff used by the monitor
//!
//! ### Platform Utilities
//! - [`ToolAvailability`] - Check for adb and scrcpy

pub mod devices;
pub mod monitor;
pub mod process;
pub mod protocol;
pub mod tool_availability;

// Public API re-exports
pub use devices::{
    discover_devices, discover_devices_with_timeout, parse_devices_output, DeviceDiscoveryResult,
    DEVICES_TIMEOUT,
};
pub use monitor::{diff_device_sets, presence_events, PresenceMonitor, DEFAULT_POLL_INTERVAL};
pub use process::{MirrorProcess, DEFAULT_STOP_TIMEOUT};
pub use protocol::parse_log_line;
pub use tool_availability::ToolAvailability;
