//! Headless mode - NDJSON event output
//!
//! Every coordinator event is printed to stdout as one JSON object per line,
//! so the CLI can be scripted or piped into other tools. Diagnostics go to
//! the log file, never to stdout.
//!
//! # Example Output
//!
//! ```json
//! {"event":"devices_changed","available":["R58M123"],"timestamp":1704700001000}
//! {"event":"session_started","device_id":"R58M123","pid":4242,"timestamp":1704700002000}
//! {"event":"transaction","device_id":"R58M123","kind":"install","path":"/a.apk","outcome":"success","detail":null,"timestamp":1704700003000}
//! ```

pub mod runner;

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use tracing::error;

use mdeck_app::{CoordinatorEvent, DeliveryOutcome};
use mdeck_core::{Outcome, TransactionKind};

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// One present device, from `mdeck devices`
    Device { device_id: String, timestamp: i64 },

    DevicesChanged {
        available: Vec<String>,
        timestamp: i64,
    },

    SessionStarted {
        device_id: String,
        pid: Option<u32>,
        timestamp: i64,
    },

    SessionStopped {
        device_id: String,
        reason: String,
        timestamp: i64,
    },

    StartFailed {
        device_id: String,
        error: String,
        timestamp: i64,
    },

    /// An install or push reached its terminal line
    Transaction {
        device_id: String,
        kind: TransactionKind,
        path: String,
        outcome: Outcome,
        detail: Option<String>,
        timestamp: i64,
    },

    Notification {
        device_id: String,
        path: String,
        outcome: Outcome,
        delivery: DeliveryOutcome,
        timestamp: i64,
    },

    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },

    Shutdown { timestamp: i64 },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn device(device_id: &str) -> Self {
        Self::Device {
            device_id: device_id.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
            timestamp: Self::now(),
        }
    }
}

impl From<&CoordinatorEvent> for HeadlessEvent {
    fn from(event: &CoordinatorEvent) -> Self {
        let timestamp = Self::now();
        match event {
            CoordinatorEvent::DevicesChanged { available } => Self::DevicesChanged {
                available: available.iter().map(|id| id.to_string()).collect(),
                timestamp,
            },
            CoordinatorEvent::SessionStarted { device_id, handle } => Self::SessionStarted {
                device_id: device_id.to_string(),
                pid: handle.pid,
                timestamp,
            },
            CoordinatorEvent::SessionStopped { device_id, reason } => Self::SessionStopped {
                device_id: device_id.to_string(),
                reason: reason.describe(),
                timestamp,
            },
            CoordinatorEvent::StartFailed { device_id, error } => Self::StartFailed {
                device_id: device_id.to_string(),
                error: error.clone(),
                timestamp,
            },
            CoordinatorEvent::TransactionCompleted(tx) => Self::Transaction {
                device_id: tx.device_id.to_string(),
                kind: tx.kind,
                path: tx.resource_path.clone(),
                outcome: tx.outcome,
                detail: tx.detail.clone(),
                timestamp,
            },
            CoordinatorEvent::NotificationDispatched { key, outcome } => Self::Notification {
                device_id: key.device_id.to_string(),
                path: key.resource_path.clone(),
                outcome: key.outcome,
                delivery: outcome.clone(),
                timestamp,
            },
            CoordinatorEvent::Shutdown => Self::Shutdown { timestamp },
        }
    }
}
