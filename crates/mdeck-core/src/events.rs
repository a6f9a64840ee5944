//! Domain event definitions

use serde::Serialize;

use crate::types::DeviceId;

// ─────────────────────────────────────────────────────────
// Process Events
// ─────────────────────────────────────────────────────────

/// Output and lifecycle signals from a mirroring child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A line written to stdout
    Stdout(String),

    /// A line written to stderr
    Stderr(String),

    /// Process exited; `None` when killed by a signal or the wait failed
    Exited { code: Option<i32> },
}

impl ProcessEvent {
    /// The log line carried by this event, if any
    pub fn line(&self) -> Option<&str> {
        match self {
            ProcessEvent::Stdout(line) | ProcessEvent::Stderr(line) => Some(line),
            ProcessEvent::Exited { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessEvent::Stdout(_) => "Stdout",
            ProcessEvent::Stderr(_) => "Stderr",
            ProcessEvent::Exited { .. } => "Exited",
        }
    }
}

// ─────────────────────────────────────────────────────────
// Presence Events
// ─────────────────────────────────────────────────────────

/// Device presence changes reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "devices", rename_all = "snake_case")]
pub enum PresenceEvent {
    Connected(Vec<DeviceId>),
    Disconnected(Vec<DeviceId>),
}

impl PresenceEvent {
    pub fn devices(&self) -> &[DeviceId] {
        match self {
            PresenceEvent::Connected(ids) | PresenceEvent::Disconnected(ids) => ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.devices().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_event_line() {
        assert_eq!(ProcessEvent::Stdout("a".into()).line(), Some("a"));
        assert_eq!(ProcessEvent::Stderr("b".into()).line(), Some("b"));
        assert_eq!(ProcessEvent::Exited { code: Some(0) }.line(), None);
    }

    #[test]
    fn test_presence_event_serializes_with_kind() {
        let ev = PresenceEvent::Disconnected(vec![DeviceId::from("D1")]);
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"kind":"disconnected","devices":["D1"]}"#);
        assert!(!ev.is_empty());
        assert!(PresenceEvent::Connected(vec![]).is_empty());
    }
}
