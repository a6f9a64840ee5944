//! Collaborator traits consumed by the coordinator
//!
//! The coordinator never touches adb, scrcpy or the OS notification system
//! directly. It talks to these traits, so the same state machine runs against
//! real tools in the CLI and against fakes in tests.
//!
//! ## Key Components
//!
//! - [`DeviceEnumerator`]: list currently present devices
//! - [`SessionLauncher`]: start and terminate mirroring processes
//! - [`NotificationSink`]: deliver user-visible notifications

mod adb;
mod notifications;
mod scrcpy;

use serde::Serialize;

use mdeck_core::prelude::*;
use mdeck_core::DeviceId;

pub use adb::AdbDeviceEnumerator;
#[cfg(feature = "desktop-notifications")]
pub use notifications::DesktopNotificationSink;
pub use notifications::{HostNotificationSink, TracingNotificationSink};
pub use scrcpy::ScrcpyLauncher;

/// Opaque token for a launched session process.
///
/// The launcher keeps the real child; the coordinator only stores this.
/// `id` is unique per launcher and is echoed back on every process event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProcessHandle {
    pub id: u64,
    pub pid: Option<u32>,
}

impl ProcessHandle {
    pub fn new(id: u64, pid: Option<u32>) -> Self {
        Self { id, pid }
    }
}

/// Device enumeration
#[trait_variant::make(DeviceEnumerator: Send)]
pub trait LocalDeviceEnumerator {
    /// List the devices the host currently reports as present
    async fn enumerate_devices(&self) -> Result<Vec<DeviceId>>;
}

/// Mirroring process lifecycle
///
/// Process output and exit are not returned here: implementations post them
/// to the coordinator as `Message::Process`, tagged with the handle id.
#[trait_variant::make(SessionLauncher: Send)]
pub trait LocalSessionLauncher {
    /// Spawn a session for `device_id`
    async fn launch_session(&self, device_id: &DeviceId, args: &[String])
        -> Result<ProcessHandle>;

    /// Terminate a previously launched session
    async fn terminate_session(&self, handle: &ProcessHandle) -> Result<()>;
}

/// User-visible notification delivery
#[trait_variant::make(NotificationSink: Send)]
pub trait LocalNotificationSink {
    async fn is_permission_granted(&self) -> bool;

    async fn send_notification(&self, title: &str, body: &str) -> Result<()>;
}
