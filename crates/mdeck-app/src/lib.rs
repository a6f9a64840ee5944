//! mdeck-app - Session coordination for Mirror Deck
//!
//! Owns every piece of mutable state: available devices, running mirroring
//! sessions, pending install/push transactions, the notified-key set and the
//! log buffers. A single [`Coordinator`] processes one [`Message`] at a time;
//! collaborators (device enumeration, process launching, notifications) sit
//! behind the traits in [`services`].

pub mod config;
pub mod coordinator;
pub mod coordinator_event;
pub mod dedup;
pub mod handle;
pub mod log_buffers;
pub mod message;
pub mod presence;
pub mod services;
pub mod session_registry;
pub mod tracker;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Re-export primary types
pub use config::Settings;
pub use coordinator::Coordinator;
pub use coordinator_event::{CoordinatorEvent, StopReason};
pub use dedup::{DeliveryOutcome, NotificationDeduplicator};
pub use handle::CoordinatorHandle;
pub use message::{Message, Snapshot};
pub use presence::PresenceReconciler;
pub use session_registry::{SessionRegistry, SessionState};
pub use tracker::TransactionTracker;

// Re-export daemon types for the CLI
pub use mdeck_daemon::{PresenceMonitor, ToolAvailability};
