//! Message types for the coordinator event loop
//!
//! Every input to the coordinator (user intents, presence batches, process
//! output, and completions of spawned work) arrives as one `Message` and is
//! handled in one non-preemptible step.

use tokio::sync::{mpsc, oneshot};

use mdeck_core::prelude::*;
use mdeck_core::{DeviceId, LogEntry, NotificationKey, PresenceEvent, ProcessEvent};

use crate::dedup::DeliveryOutcome;
use crate::services::ProcessHandle;

/// Capacity of the coordinator's message channel
pub const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Reply slot for a request
pub type Reply<T> = oneshot::Sender<Result<T>>;

/// Create the coordinator's message channel.
///
/// Created ahead of the coordinator so collaborators that post process
/// events (the launcher) can be handed a sender.
pub fn channel() -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
    mpsc::channel(MESSAGE_CHANNEL_CAPACITY)
}

/// Point-in-time copy of the coordinator's read-only views
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub available: Vec<DeviceId>,
    pub running: Vec<DeviceId>,
    pub selected: Vec<DeviceId>,
}

/// All possible inputs to the coordinator
#[derive(Debug)]
pub enum Message {
    // ─────────────────────────────────────────────────────────
    // User Intents
    // ─────────────────────────────────────────────────────────
    /// Start a mirroring session; the reply resolves when the launch does
    Start {
        device_id: DeviceId,
        args: Vec<String>,
        reply: Option<Reply<()>>,
    },

    /// Stop a mirroring session; the reply resolves after termination
    Stop {
        device_id: DeviceId,
        reply: Option<Reply<()>>,
    },

    /// Re-enumerate devices
    Refresh,

    /// Mark a device as selected in the UI
    Select(DeviceId),

    /// Clear a device's selection
    Deselect(DeviceId),

    /// Terminate every session and stop the loop
    Shutdown,

    // ─────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────
    Snapshot(oneshot::Sender<Snapshot>),

    DeviceLogs {
        device_id: DeviceId,
        reply: oneshot::Sender<Vec<LogEntry>>,
    },

    SystemLogs(oneshot::Sender<Vec<LogEntry>>),

    // ─────────────────────────────────────────────────────────
    // External Events
    // ─────────────────────────────────────────────────────────
    /// Connect/disconnect batch from the presence monitor
    Presence(PresenceEvent),

    /// Output or exit of a launched process
    Process {
        device_id: DeviceId,
        handle_id: u64,
        event: ProcessEvent,
    },

    // ─────────────────────────────────────────────────────────
    // Completions of Spawned Work
    // ─────────────────────────────────────────────────────────
    LaunchCompleted {
        device_id: DeviceId,
        ticket: u64,
        result: Result<ProcessHandle>,
        reply: Option<Reply<()>>,
    },

    TerminateCompleted {
        device_id: DeviceId,
        handle: ProcessHandle,
        result: Result<()>,
        reply: Option<Reply<()>>,
    },

    RefreshCompleted {
        generation: u64,
        result: Result<Vec<DeviceId>>,
    },

    NotificationCompleted {
        key: NotificationKey,
        outcome: DeliveryOutcome,
    },
}

impl Message {
    /// Short name for tracing
    pub fn label(&self) -> &'static str {
        match self {
            Message::Start { .. } => "Start",
            Message::Stop { .. } => "Stop",
            Message::Refresh => "Refresh",
            Message::Select(_) => "Select",
            Message::Deselect(_) => "Deselect",
            Message::Shutdown => "Shutdown",
            Message::Snapshot(_) => "Snapshot",
            Message::DeviceLogs { .. } => "DeviceLogs",
            Message::SystemLogs(_) => "SystemLogs",
            Message::Presence(_) => "Presence",
            Message::Process { .. } => "Process",
            Message::LaunchCompleted { .. } => "LaunchCompleted",
            Message::TerminateCompleted { .. } => "TerminateCompleted",
            Message::RefreshCompleted { .. } => "RefreshCompleted",
            Message::NotificationCompleted { .. } => "NotificationCompleted",
        }
    }
}
