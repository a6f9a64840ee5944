//! Application error types with rich context

use thiserror::Error;

use crate::types::DeviceId;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Device {device_id} is not available")]
    DeviceNotAvailable { device_id: DeviceId },

    #[error("A session is already running for device {device_id}")]
    AlreadyRunning { device_id: DeviceId },

    #[error("Failed to launch mirroring session: {reason}")]
    LaunchFailure { reason: String },

    #[error("Launch for device {device_id} was cancelled by a stop request")]
    LaunchCancelled { device_id: DeviceId },

    #[error("Failed to terminate mirroring session: {message}")]
    TerminationFailure { message: String },

    #[error("Mirroring process error: {message}")]
    Process { message: String },

    // ─────────────────────────────────────────────────────────────
    // Notification Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Notification permission denied")]
    NotificationPermissionDenied,

    #[error("Failed to deliver notification: {message}")]
    NotificationDeliveryFailure { message: String },

    // ─────────────────────────────────────────────────────────────
    // Tooling/Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("'{tool}' not found. Ensure it is installed and in your PATH.")]
    ToolNotFound { tool: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn device_not_available(device_id: impl Into<DeviceId>) -> Self {
        Self::DeviceNotAvailable {
            device_id: device_id.into(),
        }
    }

    pub fn already_running(device_id: impl Into<DeviceId>) -> Self {
        Self::AlreadyRunning {
            device_id: device_id.into(),
        }
    }

    pub fn launch_failure(reason: impl Into<String>) -> Self {
        Self::LaunchFailure {
            reason: reason.into(),
        }
    }

    pub fn launch_cancelled(device_id: impl Into<DeviceId>) -> Self {
        Self::LaunchCancelled {
            device_id: device_id.into(),
        }
    }

    pub fn termination_failure(message: impl Into<String>) -> Self {
        Self::TerminationFailure {
            message: message.into(),
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn notification_delivery(message: impl Into<String>) -> Self {
        Self::NotificationDeliveryFailure {
            message: message.into(),
        }
    }

    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error
    ///
    /// Everything the coordinator can produce is recoverable: the caller may
    /// re-issue start/stop/refresh.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotAvailable { .. }
                | Error::AlreadyRunning { .. }
                | Error::LaunchFailure { .. }
                | Error::LaunchCancelled { .. }
                | Error::TerminationFailure { .. }
                | Error::Process { .. }
                | Error::NotificationPermissionDenied
                | Error::NotificationDeliveryFailure { .. }
                | Error::ChannelSend { .. }
        )
    }

    /// Check if this error should trigger application exit
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ToolNotFound { .. } | Error::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::device_not_available("emulator-5554");
        assert_eq!(err.to_string(), "Device emulator-5554 is not available");

        let err = Error::already_running("R58M123");
        assert!(err.to_string().contains("already running"));

        let err = Error::tool_not_found("scrcpy");
        assert!(err.to_string().contains("'scrcpy' not found"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_session_errors_are_recoverable() {
        assert!(Error::device_not_available("d").is_recoverable());
        assert!(Error::already_running("d").is_recoverable());
        assert!(Error::launch_failure("spawn failed").is_recoverable());
        assert!(Error::launch_cancelled("d").is_recoverable());
        assert!(Error::termination_failure("kill failed").is_recoverable());
        assert!(Error::NotificationPermissionDenied.is_recoverable());
        assert!(Error::notification_delivery("dbus").is_recoverable());
    }

    #[test]
    fn test_session_errors_are_never_fatal() {
        assert!(!Error::device_not_available("d").is_fatal());
        assert!(!Error::launch_failure("x").is_fatal());
        assert!(!Error::termination_failure("x").is_fatal());
        assert!(!Error::NotificationPermissionDenied.is_fatal());
    }

    #[test]
    fn test_startup_errors_are_fatal() {
        assert!(Error::tool_not_found("adb").is_fatal());
        assert!(Error::config("bad toml").is_fatal());
        assert!(!Error::tool_not_found("adb").is_recoverable());
    }

    #[test]
    fn test_context_preserves_variant() {
        let result: std::result::Result<(), Error> = Err(Error::ChannelClosed);
        let err = result.context("sending start request").unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
    }
}
