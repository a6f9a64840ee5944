//! Domain events emitted by the coordinator for external consumers
//!
//! Events are broadcast after each message is processed via
//! `Coordinator::subscribe()`. The headless CLI prints them as NDJSON; tests
//! use them as hooks.

use mdeck_core::{CompletedTransaction, DeviceId, NotificationKey};

use crate::dedup::DeliveryOutcome;
use crate::services::ProcessHandle;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop request
    Requested,
    /// The process exited on its own
    Exited { code: Option<i32> },
    /// The device disappeared
    Disconnected,
    /// Coordinator shutdown
    Shutdown,
}

impl StopReason {
    pub fn describe(&self) -> String {
        match self {
            StopReason::Requested => "stopped".to_string(),
            StopReason::Exited { code: Some(code) } => format!("exited with code {}", code),
            StopReason::Exited { code: None } => "exited".to_string(),
            StopReason::Disconnected => "device disconnected".to_string(),
            StopReason::Shutdown => "shutdown".to_string(),
        }
    }
}

/// Domain events emitted by the coordinator.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    // ─────────────────────────────────────────────────────────
    // Devices
    // ─────────────────────────────────────────────────────────
    /// The available set changed; carries the full sorted set
    DevicesChanged { available: Vec<DeviceId> },

    // ─────────────────────────────────────────────────────────
    // Session Lifecycle
    // ─────────────────────────────────────────────────────────
    SessionStarted {
        device_id: DeviceId,
        handle: ProcessHandle,
    },

    SessionStopped {
        device_id: DeviceId,
        reason: StopReason,
    },

    StartFailed { device_id: DeviceId, error: String },

    // ─────────────────────────────────────────────────────────
    // Transactions & Notifications
    // ─────────────────────────────────────────────────────────
    TransactionCompleted(CompletedTransaction),

    NotificationDispatched {
        key: NotificationKey,
        outcome: DeliveryOutcome,
    },

    /// The loop has stopped; no further events follow
    Shutdown,
}

impl CoordinatorEvent {
    /// Short name for tracing
    pub fn label(&self) -> &'static str {
        match self {
            CoordinatorEvent::DevicesChanged { .. } => "DevicesChanged",
            CoordinatorEvent::SessionStarted { .. } => "SessionStarted",
            CoordinatorEvent::SessionStopped { .. } => "SessionStopped",
            CoordinatorEvent::StartFailed { .. } => "StartFailed",
            CoordinatorEvent::TransactionCompleted(_) => "TransactionCompleted",
            CoordinatorEvent::NotificationDispatched { .. } => "NotificationDispatched",
            CoordinatorEvent::Shutdown => "Shutdown",
        }
    }
}
